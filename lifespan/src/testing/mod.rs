//! Testing utilities for lifespan trackers and progress trees.
//!
//! This module provides:
//! - A shared release log and recording disposers
//! - Assertions for release order and progress state

mod assertions;
mod recorder;

pub use assertions::{assert_fraction, assert_released_in_order, assert_units};
pub use recorder::{FailingDisposer, RecordingDisposer, ReleaseLog};
