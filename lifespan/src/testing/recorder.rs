//! Recording disposers for testing.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::dispose::{Completion, Dispose, Disposer};
use crate::errors::LifecycleError;

/// An ordered, shared record of released labels.
#[derive(Debug, Clone, Default)]
pub struct ReleaseLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl ReleaseLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a label.
    pub fn record(&self, label: impl Into<String>) {
        self.entries.lock().push(label.into());
    }

    /// Returns all labels in release order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Returns the number of recorded releases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing was released.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// A synchronous disposer recording `label` when released.
    #[must_use]
    pub fn sync(&self, label: &str) -> Disposer {
        let log = self.clone();
        let owned = label.to_string();
        Disposer::sync(move || log.record(owned)).named(label)
    }

    /// An asynchronous disposer.
    ///
    /// `label` is recorded when the release is invoked and `label:done`
    /// once the returned future finishes after `delay`.
    #[must_use]
    pub fn delayed(&self, label: &str, delay: Duration) -> Disposer {
        let log = self.clone();
        let owned = label.to_string();
        Disposer::from_async(move || {
            log.record(owned.clone());
            async move {
                tokio::time::sleep(delay).await;
                log.record(format!("{owned}:done"));
                Ok::<(), anyhow::Error>(())
            }
        })
        .named(label)
    }

    /// A synchronous disposer that fails after recording `label`.
    #[must_use]
    pub fn failing(&self, label: &str) -> Disposer {
        let log = self.clone();
        let owned = label.to_string();
        Disposer::try_sync(move || {
            log.record(owned.clone());
            Err(anyhow::anyhow!("{owned} failed"))
        })
        .named(label)
    }
}

/// An object disposer counting its releases.
#[derive(Debug)]
pub struct RecordingDisposer {
    label: String,
    log: ReleaseLog,
    releases: AtomicUsize,
}

impl RecordingDisposer {
    /// Creates a new recording object.
    #[must_use]
    pub fn new(label: impl Into<String>, log: &ReleaseLog) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            log: log.clone(),
            releases: AtomicUsize::new(0),
        })
    }

    /// Returns how often this object was released.
    #[must_use]
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl Dispose for RecordingDisposer {
    fn dispose(&self) -> Completion {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.log.record(self.label.clone());
        Completion::done()
    }
}

/// An object disposer whose asynchronous release is rejected.
#[derive(Debug, Default)]
pub struct FailingDisposer;

impl Dispose for FailingDisposer {
    fn dispose(&self) -> Completion {
        Completion::pending(async {
            tokio::task::yield_now().await;
            Err(LifecycleError::from(anyhow::anyhow!("async release rejected")))
        })
    }
}
