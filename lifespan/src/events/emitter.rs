//! Named-event emitter.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

use crate::dispose::{Completion, EventSource, Listener};

/// Identifies a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Registered<P> {
    id: HandlerId,
    handler: Listener<P>,
}

/// Dispatches payloads to handlers registered per event name.
///
/// Handlers run in registration order. `emit` settles once every handler's
/// pending work has settled.
pub struct Emitter<P> {
    handlers: RwLock<HashMap<String, Vec<Registered<P>>>>,
    next_id: AtomicU64,
}

impl<P: Clone + Send + 'static> Emitter<P> {
    /// Creates an emitter without handlers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a handler for `event`.
    pub fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(P) -> Completion + Send + Sync + 'static,
    {
        self.on_listener(event, Arc::new(handler))
    }

    /// Registers a shared handler for `event`.
    pub fn on_listener(&self, event: &str, handler: Listener<P>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .entry(event.to_string())
            .or_default()
            .push(Registered { id, handler });
        id
    }

    /// Removes a handler. Returns true if it was registered.
    pub fn off(&self, event: &str, id: HandlerId) -> bool {
        self.remove_where(event, |r| r.id == id)
    }

    fn remove_where(&self, event: &str, pred: impl Fn(&Registered<P>) -> bool) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(event) else {
            return false;
        };
        let Some(pos) = list.iter().position(pred) else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            handlers.remove(event);
        }
        true
    }

    /// Runs every handler of `event` with `payload`.
    pub fn emit(&self, event: &str, payload: P) -> Completion {
        let handlers: Vec<Listener<P>> = self
            .handlers
            .read()
            .get(event)
            .map(|list| list.iter().map(|r| r.handler.clone()).collect())
            .unwrap_or_default();

        trace!(event, handlers = handlers.len(), "emit");
        Completion::join(handlers.iter().map(|handler| handler(payload.clone())))
    }

    /// Returns the number of handlers registered for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.handlers.read().get(event).map_or(0, Vec::len)
    }
}

impl<P: Clone + Send + 'static> Default for Emitter<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Clone + Send + 'static> EventSource<P> for Emitter<P> {
    fn on(&self, event: &str, listener: Listener<P>) {
        self.on_listener(event, listener);
    }

    fn off(&self, event: &str, listener: &Listener<P>) {
        let target = Arc::as_ptr(listener).cast::<()>();
        self.remove_where(event, |r| Arc::as_ptr(&r.handler).cast::<()>() == target);
    }
}

impl<P> std::fmt::Debug for Emitter<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let events: Vec<String> = self.handlers.read().keys().cloned().collect();
        f.debug_struct("Emitter").field("events", &events).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispose::{use_event_listener, ListenerSource};
    use crate::errors::LifecycleError;
    use crate::testing::{assert_released_in_order, ReleaseLog};
    use std::time::Duration;

    #[test]
    fn test_emit_runs_handlers_in_order() {
        let emitter: Emitter<u32> = Emitter::new();
        let log = ReleaseLog::new();

        let first = log.clone();
        emitter.on("tick", move |n| {
            first.record(format!("first:{n}"));
            Completion::done()
        });
        let second = log.clone();
        emitter.on("tick", move |n| {
            second.record(format!("second:{n}"));
            Completion::done()
        });

        assert!(emitter.emit("tick", 7).is_done());
        assert_released_in_order(&log, &["first:7", "second:7"]);
    }

    #[test]
    fn test_emit_without_handlers() {
        let emitter: Emitter<u32> = Emitter::new();
        assert!(emitter.emit("nothing", 1).is_done());
        assert_eq!(emitter.listener_count("nothing"), 0);
    }

    #[tokio::test]
    async fn test_emit_settles_after_async_handlers() {
        let emitter: Emitter<u32> = Emitter::new();
        let log = ReleaseLog::new();

        let handler_log = log.clone();
        emitter.on("tick", move |_| {
            let handler_log = handler_log.clone();
            Completion::pending(async move {
                tokio::time::sleep(Duration::from_millis(2)).await;
                handler_log.record("async");
                Ok::<(), LifecycleError>(())
            })
        });

        let completion = emitter.emit("tick", 1);
        assert!(completion.is_pending());
        assert!(log.is_empty());
        completion.await.unwrap();
        assert_released_in_order(&log, &["async"]);
    }

    #[tokio::test]
    async fn test_emit_runs_every_handler_when_one_fails() {
        let emitter: Emitter<u32> = Emitter::new();
        let log = ReleaseLog::new();

        let first = log.clone();
        emitter.on("tick", move |_| {
            let first = first.clone();
            Completion::pending(async move {
                tokio::task::yield_now().await;
                first.record("async");
                Ok::<(), LifecycleError>(())
            })
        });
        emitter.on("tick", |_| Completion::failed(anyhow::anyhow!("handler broke")));
        let last = log.clone();
        emitter.on("tick", move |_| {
            last.record("last");
            Completion::done()
        });

        let completion = emitter.emit("tick", 1);
        assert!(completion.is_pending());
        let err = completion.await.unwrap_err();
        assert!(err.to_string().contains("handler broke"));
        assert_released_in_order(&log, &["last", "async"]);
    }

    #[test]
    fn test_off_removes_handler() {
        let emitter: Emitter<u32> = Emitter::new();
        let id = emitter.on("tick", |_| Completion::done());
        assert_eq!(emitter.listener_count("tick"), 1);

        assert!(emitter.off("tick", id));
        assert!(!emitter.off("tick", id));
        assert_eq!(emitter.listener_count("tick"), 0);
    }

    #[test]
    fn test_event_listener_disposer_detaches() {
        let emitter: Arc<Emitter<u32>> = Arc::new(Emitter::new());
        let log = ReleaseLog::new();

        let handler_log = log.clone();
        let listener: Listener<u32> = Arc::new(move |n| {
            handler_log.record(n.to_string());
            Completion::done()
        });
        let disposer = use_event_listener(
            Some(ListenerSource::Emitter(emitter.clone())),
            "tick",
            listener,
        );

        assert!(emitter.emit("tick", 1).is_done());
        assert!(disposer.release().is_done());
        assert!(emitter.emit("tick", 2).is_done());

        assert_released_in_order(&log, &["1"]);
        assert_eq!(emitter.listener_count("tick"), 0);
    }
}
