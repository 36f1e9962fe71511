//! Error types for the lifespan framework.
//!
//! Misuse of a synchronous contract and unrecognized step shapes are raised
//! by the framework itself; failures inside a disposer, step or handler are
//! carried through unchanged as [`LifecycleError::Release`].

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// The main error type for lifespan operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// An asynchronous release or step was found while synchronous
    /// completion was demanded.
    #[error("Async disposable found while sync completion was required: {label}")]
    SyncViolation {
        /// Diagnostic label of the offending entry.
        label: String,
    },

    /// A step that is neither callable nor an in-flight operation.
    #[error("Unhandled step: {label}")]
    UnrecognizedStep {
        /// Diagnostic label of the offending step.
        label: String,
    },

    /// A disposer, step or handler failed.
    #[error("Release failed: {0}")]
    Release(#[from] anyhow::Error),
}

impl LifecycleError {
    /// Creates a sync violation error for the given label.
    #[must_use]
    pub fn sync_violation(label: impl Into<String>) -> Self {
        Self::SyncViolation {
            label: label.into(),
        }
    }

    /// Creates an unrecognized step error for the given label.
    #[must_use]
    pub fn unrecognized_step(label: impl Into<String>) -> Self {
        Self::UnrecognizedStep {
            label: label.into(),
        }
    }

    /// Returns true if this error signals a violated sync contract.
    #[must_use]
    pub const fn is_sync_violation(&self) -> bool {
        matches!(self, Self::SyncViolation { .. })
    }

    /// Returns true if this error came from a collaborator.
    #[must_use]
    pub const fn is_release_failure(&self) -> bool {
        matches!(self, Self::Release(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_violation_display() {
        let err = LifecycleError::sync_violation("timer");
        assert!(err.is_sync_violation());
        assert!(err.to_string().contains("timer"));
    }

    #[test]
    fn test_unrecognized_step_display() {
        let err = LifecycleError::unrecognized_step("object");
        assert!(!err.is_sync_violation());
        assert_eq!(err.to_string(), "Unhandled step: object");
    }

    #[test]
    fn test_release_from_anyhow() {
        let err: LifecycleError = anyhow::anyhow!("socket already closed").into();
        assert!(err.is_release_failure());
        assert!(err.to_string().contains("socket already closed"));
    }
}
