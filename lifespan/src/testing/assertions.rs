//! Test assertions for release order and progress state.

use crate::progress::ProgressNode;
use crate::testing::ReleaseLog;

/// Asserts that `log` recorded exactly `expected`, in order.
pub fn assert_released_in_order(log: &ReleaseLog, expected: &[&str]) {
    let actual = log.entries();
    assert_eq!(
        actual, expected,
        "Expected release order {expected:?}, got {actual:?}"
    );
}

/// Asserts the aggregated units of a progress node.
pub fn assert_units(node: &ProgressNode, total: f64, completed: f64) {
    let (actual_total, actual_completed) = (node.get_total_units(), node.get_completed_units());
    assert!(
        (actual_total - total).abs() < f64::EPSILON
            && (actual_completed - completed).abs() < f64::EPSILON,
        "Expected {completed} of {total} units on '{}', got {actual_completed} of {actual_total}",
        node.name()
    );
}

/// Asserts the fraction of a progress node within a small tolerance.
pub fn assert_fraction(node: &ProgressNode, expected: f64) {
    let actual = node.get_fraction();
    assert!(
        (actual - expected).abs() < 1e-9,
        "Expected fraction {expected} on '{}', got {actual}",
        node.name()
    );
}
