//! Progress node configuration and event names.

use serde::{Deserialize, Serialize};

/// Notifications a progress node emits to its observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProgressEvent {
    /// Units, children or the cancelled flag changed.
    #[serde(rename = "progressChanged")]
    Changed,
    /// Cancellation was requested.
    #[serde(rename = "progressCancelled")]
    Cancelled,
    /// The node was disposed.
    #[serde(rename = "progressDispose")]
    Dispose,
}

impl ProgressEvent {
    /// Returns the event name used on the emitter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Changed => "progressChanged",
            Self::Cancelled => "progressCancelled",
            Self::Dispose => "progressDispose",
        }
    }
}

impl std::fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a progress node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Node name; generated when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Own units of work, excluding children.
    #[serde(default)]
    pub total_units: f64,
    /// Own completed units, excluding children.
    #[serde(default)]
    pub completed_units: f64,
    /// Whether a cancelled node becomes active again once all units complete.
    #[serde(default = "default_reset_on_finish")]
    pub reset_on_finish: bool,
}

fn default_reset_on_finish() -> bool {
    true
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            name: None,
            total_units: 0.0,
            completed_units: 0.0,
            reset_on_finish: default_reset_on_finish(),
        }
    }
}

impl ProgressConfig {
    /// Creates a new progress configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the own total units.
    #[must_use]
    pub fn with_total_units(mut self, units: f64) -> Self {
        self.total_units = units;
        self
    }

    /// Sets the own completed units.
    #[must_use]
    pub fn with_completed_units(mut self, units: f64) -> Self {
        self.completed_units = units;
        self
    }

    /// Sets the auto-reset behavior.
    #[must_use]
    pub fn with_reset_on_finish(mut self, reset: bool) -> Self {
        self.reset_on_finish = reset;
        self
    }
}
