//! Deferred one-shot steps executed in sequence.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

use super::{Completion, Disposer};
use crate::errors::{LifecycleError, Result};
use crate::events::try_spawn;

/// Order in which a [`DeferQueue`] consumes its steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeferMode {
    /// First added, first run.
    #[default]
    Fifo,
    /// Last added, first run.
    Lifo,
}

/// A queue of one-shot steps.
///
/// Steps are removed before they run, so a step may add further steps and
/// they are picked up by the same run. Only callables and in-flight
/// operations are valid steps.
#[derive(Clone, Default)]
pub struct DeferQueue {
    mode: DeferMode,
    steps: Arc<Mutex<VecDeque<Disposer>>>,
}

impl DeferQueue {
    /// Creates a FIFO queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a queue with the given consumption order.
    #[must_use]
    pub fn with_mode(mode: DeferMode) -> Self {
        Self {
            mode,
            steps: Arc::default(),
        }
    }

    /// Returns the consumption order.
    #[must_use]
    pub const fn mode(&self) -> DeferMode {
        self.mode
    }

    /// Adds a step.
    pub fn add(&self, step: Disposer) {
        let mut steps = self.steps.lock();
        match self.mode {
            DeferMode::Fifo => steps.push_back(step),
            DeferMode::Lifo => steps.push_front(step),
        }
    }

    /// Returns the number of queued steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.lock().len()
    }

    /// Returns true if no step is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.lock().is_empty()
    }

    /// Runs every step, awaiting asynchronous ones one at a time.
    pub async fn exec(&self) -> Result<()> {
        self.exec_with(false).await
    }

    /// Runs every step.
    ///
    /// With `expect_sync` set, the first step handing back in-flight work
    /// stops the run with [`LifecycleError::SyncViolation`] and the
    /// remaining steps stay queued. The in-flight work is spawned onto the
    /// current tokio runtime, or queued again at the head when there is none.
    pub async fn exec_with(&self, expect_sync: bool) -> Result<()> {
        while let Some(step) = self.next() {
            match self.run_step(step, expect_sync) {
                Completion::Ready(result) => result?,
                Completion::Pending(fut) => fut.await?,
            }
        }
        Ok(())
    }

    /// Runs every step without awaiting.
    pub fn exec_sync(&self) -> Result<()> {
        while let Some(step) = self.next() {
            self.run_step(step, true).into_sync("step")?;
        }
        Ok(())
    }

    fn next(&self) -> Option<Disposer> {
        self.steps.lock().pop_front()
    }

    fn run_step(&self, step: Disposer, expect_sync: bool) -> Completion {
        if !step.is_step() {
            return Completion::failed(LifecycleError::unrecognized_step(step.label()));
        }
        let label = expect_sync.then(|| step.label().to_string());

        match (step.release(), label) {
            (Completion::Pending(fut), Some(label)) => {
                if let Some(fut) = try_spawn(&label, fut) {
                    let step = Disposer::in_flight(fut).named(label.clone());
                    self.steps.lock().push_front(step);
                }
                Completion::failed(LifecycleError::sync_violation(label))
            }
            (completion, _) => completion,
        }
    }
}

impl std::fmt::Debug for DeferQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferQueue")
            .field("mode", &self.mode)
            .field("len", &self.len())
            .finish()
    }
}
