//! Disposable wrappers around timers and event listeners.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::trace;

use super::{Completion, Dispose, Disposer};

/// A scheduled timer that can be cancelled exactly once.
pub struct Timer {
    kind: &'static str,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Timer {
    fn spawn(kind: &'static str, handle: JoinHandle<()>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Cancels the timer.
    ///
    /// Returns true on the first call only, and only while the timer had
    /// not run to completion.
    pub fn cancel(&self) -> bool {
        match self.handle.lock().take() {
            Some(handle) if !handle.is_finished() => {
                trace!(kind = self.kind, "timer cancelled");
                handle.abort();
                true
            }
            _ => false,
        }
    }

    /// Returns true until the timer is cancelled or a timeout has fired.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Dispose for Timer {
    fn dispose(&self) -> Completion {
        self.cancel();
        Completion::done()
    }
}

impl From<Arc<Timer>> for Disposer {
    fn from(timer: Arc<Timer>) -> Self {
        let kind = timer.kind;
        Self::object(timer).named(kind)
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("kind", &self.kind)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Runs `f` once after `delay`.
///
/// # Panics
///
/// Panics when called outside a tokio runtime.
pub fn use_timeout<F>(f: F, delay: Duration) -> Arc<Timer>
where
    F: FnOnce() + Send + 'static,
{
    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        f();
    });
    Timer::spawn("timeout", handle)
}

/// Runs `f` every `period`, first after one full period.
///
/// # Panics
///
/// Panics when called outside a tokio runtime.
pub fn use_interval<F>(mut f: F, period: Duration) -> Arc<Timer>
where
    F: FnMut() + Send + 'static,
{
    let handle = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            ticker.tick().await;
            f();
        }
    });
    Timer::spawn("interval", handle)
}

/// A listener callback shared between attach and detach.
pub type Listener<P> = Arc<dyn Fn(P) -> Completion + Send + Sync>;

/// Something exposing an `on`/`off` pair.
pub trait EventSource<P>: Send + Sync {
    /// Attaches a listener.
    fn on(&self, event: &str, listener: Listener<P>);
    /// Detaches a listener previously given to [`on`](Self::on).
    fn off(&self, event: &str, listener: &Listener<P>);
}

/// Something exposing an add/remove listener pair.
pub trait EventTarget<P>: Send + Sync {
    /// Attaches a listener.
    fn add_event_listener(&self, event: &str, listener: Listener<P>);
    /// Detaches a listener previously attached.
    fn remove_event_listener(&self, event: &str, listener: &Listener<P>);
}

/// The object a listener is attached to.
pub enum ListenerSource<P> {
    /// Preferred `on`/`off` pair.
    Emitter(Arc<dyn EventSource<P>>),
    /// Add/remove listener pair.
    Target(Arc<dyn EventTarget<P>>),
}

impl<P> ListenerSource<P> {
    fn attach(&self, event: &str, listener: Listener<P>) {
        match self {
            Self::Emitter(source) => source.on(event, listener),
            Self::Target(target) => target.add_event_listener(event, listener),
        }
    }

    fn detach(&self, event: &str, listener: &Listener<P>) {
        match self {
            Self::Emitter(source) => source.off(event, listener),
            Self::Target(target) => target.remove_event_listener(event, listener),
        }
    }
}

/// Attaches `listener` to `event` and returns a disposer detaching it.
///
/// Without a source nothing is attached and the disposer does nothing.
pub fn use_event_listener<P: 'static>(
    source: Option<ListenerSource<P>>,
    event: &str,
    listener: Listener<P>,
) -> Disposer {
    let Some(source) = source else {
        return Disposer::sync(|| {}).named("listener");
    };

    source.attach(event, listener.clone());
    let event = event.to_string();
    Disposer::sync(move || source.detach(&event, &listener)).named("listener")
}
