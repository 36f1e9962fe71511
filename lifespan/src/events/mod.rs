//! Event emission for progress observers.
//!
//! This module provides the minimal emitter the progress tree notifies its
//! observers through, plus a helper for notifications nobody awaits.

mod emitter;

pub use emitter::{Emitter, HandlerId};

use futures::future::BoxFuture;
use tracing::warn;

use crate::dispose::Completion;
use crate::errors::Result;

/// Drives a notification nobody awaits.
///
/// Pending work is spawned onto the current tokio runtime. Without a runtime
/// it cannot make progress and is dropped with a warning.
pub fn fire_and_forget(event: &str, completion: Completion) {
    match completion {
        Completion::Ready(Ok(())) => {}
        Completion::Ready(Err(err)) => {
            warn!(event, error = %err, "Notification handler failed");
        }
        Completion::Pending(fut) => {
            if try_spawn(event, fut).is_some() {
                warn!(event, "No runtime for pending notification, dropping it");
            }
        }
    }
}

/// Spawns in-flight work onto the current tokio runtime.
///
/// Failures are logged under `event`. Without a runtime the work is handed
/// back untouched.
pub fn try_spawn(
    event: &str,
    fut: BoxFuture<'static, Result<()>>,
) -> Option<BoxFuture<'static, Result<()>>> {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        return Some(fut);
    };
    let event = event.to_string();
    handle.spawn(async move {
        if let Err(err) = fut.await {
            warn!(event = %event, error = %err, "Detached operation failed");
        }
    });
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fire_and_forget_spawns_pending() {
        let done = Arc::new(AtomicBool::new(false));
        let done_clone = done.clone();
        fire_and_forget(
            "test",
            Completion::pending(async move {
                done_clone.store(true, Ordering::SeqCst);
                Ok::<(), crate::errors::LifecycleError>(())
            }),
        );

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn test_try_spawn_hands_back_without_runtime() {
        let fut = Completion::pending(async { Ok::<(), crate::errors::LifecycleError>(()) });
        let Completion::Pending(fut) = fut else {
            panic!("expected pending completion");
        };
        let returned = try_spawn("test", fut);
        assert!(returned.is_some());
    }

    #[test]
    fn test_fire_and_forget_without_runtime() {
        fire_and_forget(
            "test",
            Completion::pending(async { Ok::<(), crate::errors::LifecycleError>(()) }),
        );
        fire_and_forget("test", Completion::failed(anyhow::anyhow!("ignored")));
    }
}
