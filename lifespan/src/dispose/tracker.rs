//! LIFO disposal tracker.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

use super::{Completion, Dispose, Disposer};
use crate::errors::{LifecycleError, Result};
use crate::events::try_spawn;

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one registration in a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(u64);

impl EntryId {
    fn next() -> Self {
        Self(NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Configuration for a [`DisposalTracker`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Diagnostic name, also used as the log label.
    #[serde(default)]
    pub name: Option<String>,
    /// Whether dispose passes are logged.
    #[serde(default = "default_log")]
    pub log: bool,
}

fn default_log() -> bool {
    true
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            name: None,
            log: default_log(),
        }
    }
}

impl TrackerConfig {
    /// Creates a new tracker configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the diagnostic name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enables or disables logging.
    #[must_use]
    pub fn with_log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }
}

struct Entry {
    id: EntryId,
    disposer: Disposer,
}

struct TrackerInner {
    name: Option<String>,
    log: bool,
    /// Newest registration first.
    entries: Mutex<VecDeque<Entry>>,
    passes: AtomicUsize,
}

impl TrackerInner {
    fn take(&self, id: EntryId) -> Option<Entry> {
        let mut entries = self.entries.lock();
        let pos = entries.iter().position(|e| e.id == id)?;
        entries.remove(pos)
    }
}

/// Tracks disposables and releases them newest first.
///
/// The tracker is a cheap handle; clones share the same registrations, so a
/// disposer may capture a clone and register further entries while it is
/// being released.
#[derive(Clone)]
pub struct DisposalTracker {
    inner: Arc<TrackerInner>,
}

impl DisposalTracker {
    /// Creates an unnamed tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TrackerConfig::default())
    }

    /// Creates a tracker whose dispose passes are logged under `name`.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::with_config(TrackerConfig::new().with_name(name))
    }

    /// Creates a tracker from a configuration.
    #[must_use]
    pub fn with_config(config: TrackerConfig) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                name: config.name,
                log: config.log,
                entries: Mutex::new(VecDeque::new()),
                passes: AtomicUsize::new(0),
            }),
        }
    }

    /// Returns the diagnostic name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Registers a disposable at the front of the release order.
    ///
    /// Returns `None` when given nothing to track. The returned handle
    /// releases only this registration.
    pub fn track(&self, disposer: impl Into<Option<Disposer>>) -> Option<Unregister> {
        let disposer = disposer.into()?;
        let id = EntryId::next();
        trace!(tracker = ?self.inner.name, label = disposer.label(), "track");
        self.inner.entries.lock().push_front(Entry { id, disposer });

        Some(Unregister {
            tracker: Arc::downgrade(&self.inner),
            id,
            called: AtomicBool::new(false),
        })
    }

    /// Alias for [`track`](Self::track).
    pub fn add(&self, disposer: impl Into<Option<Disposer>>) -> Option<Unregister> {
        self.track(disposer)
    }

    /// Removes and releases one registration.
    ///
    /// Unknown ids are a no-op.
    pub fn untrack(&self, id: EntryId) -> Completion {
        self.inner
            .take(id)
            .map_or_else(Completion::done, |entry| entry.disposer.release())
    }

    /// Alias for [`untrack`](Self::untrack).
    pub fn remove(&self, id: EntryId) -> Completion {
        self.untrack(id)
    }

    /// Removes and releases the first registration of `obj`.
    ///
    /// Further registrations of the same object stay tracked.
    pub fn untrack_object(&self, obj: &Arc<dyn Dispose>) -> Completion {
        let entry = {
            let mut entries = self.inner.entries.lock();
            entries
                .iter()
                .position(|e| e.disposer.is_object(obj))
                .and_then(|pos| entries.remove(pos))
        };
        entry.map_or_else(Completion::done, |entry| entry.disposer.release())
    }

    /// Releases every registration, newest first.
    ///
    /// Synchronous releases run inline. Asynchronous ones are invoked in
    /// order and awaited together through the returned completion.
    pub fn dispose(&self) -> Completion {
        self.dispose_strict(false)
    }

    /// Releases every registration, failing on the first asynchronous
    /// release.
    pub fn dispose_sync(&self) -> Result<()> {
        self.dispose_strict(true).into_sync("dispose")
    }

    /// Releases every registration, newest first.
    ///
    /// With `strict` set, the first release that hands back in-flight work
    /// stops the pass with [`LifecycleError::SyncViolation`]; registrations
    /// not reached yet stay tracked. The in-flight work is spawned onto the
    /// current tokio runtime, or tracked again at the front when there is
    /// none. A synchronous failure also stops the pass, after already
    /// invoked asynchronous releases settle.
    pub fn dispose_strict(&self, strict: bool) -> Completion {
        self.inner.passes.fetch_add(1, Ordering::SeqCst);
        if let Some(name) = self.inner.name.as_deref() {
            if self.inner.log {
                let entries = self.len();
                debug!(tracker = %name, entries, "dispose \"{}\": {} entries", name, entries);
            }
        }

        let mut pending = Vec::new();
        loop {
            let Some(entry) = self.inner.entries.lock().pop_front() else {
                break;
            };
            let label = strict.then(|| entry.disposer.label().to_string());

            match (entry.disposer.release(), label) {
                (Completion::Ready(Ok(())), _) => {}
                (Completion::Ready(Err(err)), _) => return Completion::fail_after(pending, err),
                (Completion::Pending(fut), Some(label)) => {
                    if let Some(fut) = try_spawn(&label, fut) {
                        let disposer = Disposer::in_flight(fut).named(label.clone());
                        self.inner.entries.lock().push_front(Entry {
                            id: entry.id,
                            disposer,
                        });
                    }
                    return Completion::failed(LifecycleError::sync_violation(label));
                }
                (completion, None) => pending.push(completion),
            }
        }

        Completion::join(pending)
    }

    /// Returns the number of tracked registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Returns true if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }

    /// Returns true once a dispose pass ran and nothing is tracked anymore.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.passes.load(Ordering::SeqCst) > 0 && self.is_empty()
    }
}

impl Default for DisposalTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispose for DisposalTracker {
    fn dispose(&self) -> Completion {
        Self::dispose(self)
    }
}

impl std::fmt::Debug for DisposalTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposalTracker")
            .field("name", &self.inner.name)
            .field("len", &self.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Handle returned by [`DisposalTracker::track`].
///
/// Calling it releases the one registration it belongs to. Later calls, or
/// calls after the tracker released everything, do nothing.
pub struct Unregister {
    tracker: Weak<TrackerInner>,
    id: EntryId,
    called: AtomicBool,
}

impl Unregister {
    /// Returns the id of the registration.
    #[must_use]
    pub const fn id(&self) -> EntryId {
        self.id
    }

    /// Removes and releases the registration.
    pub fn call(&self) -> Completion {
        if self.called.swap(true, Ordering::SeqCst) {
            return Completion::done();
        }
        self.tracker
            .upgrade()
            .and_then(|inner| inner.take(self.id))
            .map_or_else(Completion::done, |entry| entry.disposer.release())
    }
}

impl From<Unregister> for Disposer {
    fn from(handle: Unregister) -> Self {
        Self::from_fn(move || handle.call()).named("unregister")
    }
}

impl std::fmt::Debug for Unregister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unregister")
            .field("id", &self.id)
            .field("called", &self.called.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_released_in_order, FailingDisposer, RecordingDisposer, ReleaseLog};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn test_tracker_creation() {
        let tracker = DisposalTracker::new();
        assert_eq!(tracker.len(), 0);
        assert!(tracker.is_empty());
        assert!(!tracker.is_disposed());
    }

    #[test]
    fn test_track_none_returns_none() {
        let tracker = DisposalTracker::new();
        assert!(tracker.track(None).is_none());
        assert_eq!(tracker.len(), 0);
    }

    #[test]
    fn test_lifo_order() {
        let tracker = DisposalTracker::named("lifo");
        let log = ReleaseLog::new();

        tracker.track(log.sync("a"));
        tracker.track(log.sync("b"));
        tracker.track(log.sync("c"));
        assert_eq!(tracker.len(), 3);

        tracker.dispose_sync().unwrap();

        assert_released_in_order(&log, &["c", "b", "a"]);
        assert!(tracker.is_disposed());
    }

    #[test]
    fn test_dispose_twice_is_noop() {
        let tracker = DisposalTracker::new();
        assert!(tracker.dispose().is_done());
        assert!(tracker.dispose().is_done());
        assert!(tracker.dispose_sync().is_ok());
        assert!(tracker.is_disposed());
    }

    #[test]
    fn test_unregister_releases_only_its_entry() {
        let tracker = DisposalTracker::new();
        let log = ReleaseLog::new();

        tracker.track(log.sync("a"));
        let handle = tracker.track(log.sync("x")).unwrap();
        tracker.track(log.sync("b"));

        assert!(handle.call().is_done());
        assert_released_in_order(&log, &["x"]);
        assert_eq!(tracker.len(), 2);

        tracker.dispose_sync().unwrap();
        assert_released_in_order(&log, &["x", "b", "a"]);

        assert!(handle.call().is_done());
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_unregister_after_dispose_is_noop() {
        let tracker = DisposalTracker::new();
        let log = ReleaseLog::new();
        let handle = tracker.track(log.sync("a")).unwrap();

        tracker.dispose_sync().unwrap();
        assert!(handle.call().is_done());
        assert_released_in_order(&log, &["a"]);
    }

    #[test]
    fn test_untrack_unknown_is_noop() {
        let tracker = DisposalTracker::new();
        let log = ReleaseLog::new();
        let handle = tracker.track(log.sync("a")).unwrap();
        let id = handle.id();

        assert!(tracker.untrack(id).is_done());
        assert!(tracker.untrack(id).is_done());
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_strict_sync_rejects_async_release() {
        let tracker = DisposalTracker::new();
        let log = ReleaseLog::new();

        tracker.track(log.sync("a"));
        tracker.track(log.delayed("slow", Duration::from_millis(1)));
        tracker.track(log.sync("c"));

        let err = tracker.dispose_sync().unwrap_err();
        assert!(err.is_sync_violation());
        assert!(err.to_string().contains("slow"));

        // "c" was due before the offending entry, "a" is still tracked.
        assert_released_in_order(&log, &["c", "slow"]);
        assert_eq!(tracker.len(), 1);
        assert!(!tracker.is_disposed());

        tracker.dispose().await.unwrap();
        assert_released_in_order(&log, &["c", "slow", "a"]);
    }

    #[tokio::test]
    async fn test_strict_sync_keeps_in_flight_release_running() {
        let tracker = DisposalTracker::new();
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        tracker.track(Disposer::pending(async move {
            flag.store(true, Ordering::SeqCst);
            Ok::<(), anyhow::Error>(())
        }));

        let err = tracker.dispose_sync().unwrap_err();
        assert!(err.is_sync_violation());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(released.load(Ordering::SeqCst));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_strict_sync_without_runtime_keeps_release_tracked() {
        let tracker = DisposalTracker::new();
        let log = ReleaseLog::new();
        tracker.track(log.sync("a"));
        let handle = tracker
            .track(log.delayed("slow", Duration::from_millis(1)))
            .unwrap();

        let err = tracker.dispose_sync().unwrap_err();
        assert!(err.is_sync_violation());
        assert_eq!(tracker.len(), 2);

        // The in-flight release is still owned by its original registration.
        let completion = handle.call();
        assert!(completion.is_pending());
        tokio_test::block_on(async move { completion.await }).unwrap();
        assert_released_in_order(&log, &["slow", "slow:done"]);

        tracker.dispose_sync().unwrap();
        assert_released_in_order(&log, &["slow", "slow:done", "a"]);
    }

    #[tokio::test]
    async fn test_sync_failure_waits_for_invoked_async_releases() {
        let tracker = DisposalTracker::new();
        let log = ReleaseLog::new();

        tracker.track(log.sync("a"));
        tracker.track(log.failing("broken"));
        tracker.track(log.delayed("c", Duration::from_millis(5)));

        let completion = tracker.dispose();
        assert!(completion.is_pending());
        let err = completion.await.unwrap_err();

        assert!(err.is_release_failure());
        assert!(err.to_string().contains("broken"));
        assert_released_in_order(&log, &["c", "broken", "c:done"]);
        assert_eq!(tracker.len(), 1);
    }

    #[tokio::test]
    async fn test_async_releases_are_awaited_in_lifo_invocation_order() {
        let tracker = DisposalTracker::new();
        let log = ReleaseLog::new();

        tracker.track(log.delayed("a", Duration::from_millis(5)));
        tracker.track(log.sync("b"));
        tracker.track(log.delayed("c", Duration::from_millis(1)));

        let completion = tracker.dispose();
        assert!(completion.is_pending());
        assert_released_in_order(&log, &["c", "b", "a"]);
        assert!(tracker.is_disposed());

        completion.await.unwrap();
        let entries = log.entries();
        assert!(entries.contains(&"a:done".to_string()));
        assert!(entries.contains(&"c:done".to_string()));
    }

    #[test]
    fn test_reentrant_registration_uses_live_sequence() {
        let tracker = DisposalTracker::new();
        let log = ReleaseLog::new();

        tracker.track(log.sync("a"));
        let inner_tracker = tracker.clone();
        let inner_log = log.clone();
        tracker.track(Disposer::sync(move || {
            inner_log.record("b");
            inner_tracker.track(inner_log.sync("late"));
        }));

        tracker.dispose_sync().unwrap();
        assert_released_in_order(&log, &["b", "late", "a"]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_sync_failure_stops_pass() {
        let tracker = DisposalTracker::new();
        let log = ReleaseLog::new();

        tracker.track(log.sync("a"));
        tracker.track(log.failing("broken"));
        tracker.track(log.sync("c"));

        let err = tracker.dispose_sync().unwrap_err();
        assert!(err.is_release_failure());
        assert_released_in_order(&log, &["c", "broken"]);
        assert_eq!(tracker.len(), 1);
    }

    #[tokio::test]
    async fn test_async_rejection_fails_aggregate() {
        let tracker = DisposalTracker::new();
        let log = ReleaseLog::new();

        tracker.track(log.delayed("a", Duration::from_millis(1)));
        tracker.track(Disposer::object(Arc::new(FailingDisposer)));

        let err = tracker.dispose().await.unwrap_err();
        assert!(err.is_release_failure());
        // Invocation already happened before awaiting.
        assert!(log.entries().contains(&"a".to_string()));
    }

    #[test]
    fn test_untrack_object_first_match_only() {
        let tracker = DisposalTracker::new();
        let log = ReleaseLog::new();
        let obj = RecordingDisposer::new("shared", &log);
        let as_dispose: Arc<dyn Dispose> = obj.clone();

        tracker.track(Disposer::object(as_dispose.clone()));
        tracker.track(Disposer::object(as_dispose.clone()));
        assert_eq!(tracker.len(), 2);

        assert!(tracker.untrack_object(&as_dispose).is_done());
        assert_eq!(obj.releases(), 1);
        assert_eq!(tracker.len(), 1);

        tracker.dispose_sync().unwrap();
        assert_eq!(obj.releases(), 2);
    }

    #[test]
    fn test_nested_trackers() {
        let outer = DisposalTracker::named("outer");
        let inner = DisposalTracker::named("inner");
        let log = ReleaseLog::new();

        outer.track(log.sync("outer-a"));
        inner.track(log.sync("inner-a"));
        inner.track(log.sync("inner-b"));
        outer.track(Disposer::object(Arc::new(inner.clone())));

        outer.dispose_sync().unwrap();
        assert_released_in_order(&log, &["inner-b", "inner-a", "outer-a"]);
        assert!(inner.is_disposed());
    }

    #[test]
    fn test_unregister_as_disposer() {
        let parent = DisposalTracker::new();
        let child = DisposalTracker::new();
        let log = ReleaseLog::new();

        let handle = child.track(log.sync("resource")).unwrap();
        parent.track(Disposer::from(handle));

        parent.dispose_sync().unwrap();
        assert_released_in_order(&log, &["resource"]);
        assert!(child.is_empty());
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: TrackerConfig = serde_json::from_str(r#"{"name": "session"}"#).unwrap();
        assert_eq!(config.name.as_deref(), Some("session"));
        assert!(config.log);

        let tracker = DisposalTracker::with_config(config.with_log(false));
        assert_eq!(tracker.name(), Some("session"));
    }
}
