//! Hierarchical, cancellable progress tracking.

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::IntoFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;
use uuid::Uuid;

use super::{ProgressConfig, ProgressEvent};
use crate::dispose::{
    Completion, DisposalTracker, Dispose, Disposer, TrackerConfig, Unregister,
};
use crate::errors::{LifecycleError, Result};
use crate::events::{fire_and_forget, Emitter, HandlerId};

static NEXT_NAME: AtomicU64 = AtomicU64::new(0);

fn generated_name() -> String {
    format!("progress-{}", NEXT_NAME.fetch_add(1, Ordering::Relaxed))
}

/// Where a node is in its disposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Active,
    /// The tree release was handed out but has not started yet.
    Scheduled,
    Releasing,
    Released,
}

struct NodeState {
    phase: Phase,
    total_units: f64,
    completed_units: f64,
    cancelled: bool,
    children: Vec<ProgressNode>,
    /// Back links captured by `add_child`; never owning.
    parents: Vec<Weak<NodeInner>>,
}

struct NodeInner {
    id: Uuid,
    name: String,
    reset_on_finish: bool,
    state: Mutex<NodeState>,
    events: Emitter<ProgressNode>,
    tracker: DisposalTracker,
}

/// One node of a weighted, cancellable unit-of-work tree.
///
/// Handles are cheap to clone and compare by identity. A parent owns its
/// children; children only keep weak links back to their parents, which
/// they use to report changes and to detach themselves on dispose.
#[derive(Clone)]
pub struct ProgressNode {
    inner: Arc<NodeInner>,
}

/// Serializable view of a progress tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Node id.
    pub id: Uuid,
    /// Node name.
    pub name: String,
    /// Own total units.
    pub total_units: f64,
    /// Own completed units.
    pub completed_units: f64,
    /// Aggregated fraction in `[0, 1]`.
    pub fraction: f64,
    /// Whether cancellation was requested.
    pub cancelled: bool,
    /// Whether the fraction cannot be computed.
    pub indeterminate: bool,
    /// Child snapshots in child order.
    pub children: Vec<ProgressSnapshot>,
}

impl ProgressNode {
    /// Creates an indeterminate node with a generated name.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ProgressConfig::default())
    }

    /// Creates a node from a configuration.
    #[must_use]
    pub fn with_config(config: ProgressConfig) -> Self {
        let name = config.name.unwrap_or_else(generated_name);
        let tracker = DisposalTracker::with_config(TrackerConfig::new().with_name(name.clone()));
        let inner = Arc::new(NodeInner {
            id: Uuid::new_v4(),
            name,
            reset_on_finish: config.reset_on_finish,
            state: Mutex::new(NodeState {
                phase: Phase::Active,
                total_units: config.total_units,
                completed_units: config.completed_units,
                cancelled: false,
                children: Vec::new(),
                parents: Vec::new(),
            }),
            events: Emitter::new(),
            tracker,
        });

        let weak = Arc::downgrade(&inner);
        inner.tracker.track(
            Disposer::from_fn(move || match weak.upgrade() {
                Some(inner) => {
                    let node = Self { inner };
                    node.schedule_release();
                    Completion::pending(node.release_tree())
                }
                None => Completion::done(),
            })
            .named("progress-tree"),
        );

        Self { inner }
    }

    /// Returns the node id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Returns the node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the tracker released when this node is disposed.
    ///
    /// Resources tracked here are released newest first, before the
    /// children are disposed.
    #[must_use]
    pub fn tracker(&self) -> &DisposalTracker {
        &self.inner.tracker
    }

    /// Ties `disposer` to the lifetime of this node.
    pub fn track(&self, disposer: impl Into<Option<Disposer>>) -> Option<Unregister> {
        self.inner.tracker.track(disposer)
    }

    /// Registers an observer for `event`.
    pub fn on<F>(&self, event: ProgressEvent, handler: F) -> HandlerId
    where
        F: Fn(Self) -> Completion + Send + Sync + 'static,
    {
        self.inner.events.on(event.as_str(), handler)
    }

    /// Removes an observer.
    pub fn off(&self, event: ProgressEvent, id: HandlerId) -> bool {
        self.inner.events.off(event.as_str(), id)
    }

    fn emit(&self, event: ProgressEvent) -> Completion {
        self.inner.events.emit(event.as_str(), self.clone())
    }

    /// Sets own total units and optionally own completed units.
    pub fn set_total_units(&self, units: f64, completed_units: Option<f64>) {
        self.mutate(|state| {
            state.total_units = units;
            if let Some(completed) = completed_units {
                state.completed_units = completed;
            }
        });
    }

    /// Sets own completed units.
    pub fn set_completed_units(&self, units: f64) {
        self.mutate(|state| state.completed_units = units);
    }

    /// Marks all own units as completed.
    pub fn set_completed(&self) {
        self.mutate(|state| state.completed_units = state.total_units);
    }

    /// Adds `step` to own completed units.
    pub fn inc_completed_units(&self, step: f64) {
        self.mutate(|state| state.completed_units += step);
    }

    /// Adds one completed unit.
    pub fn inc(&self) {
        self.inc_completed_units(1.0);
    }

    fn mutate(&self, f: impl FnOnce(&mut NodeState)) {
        if self.is_closed() {
            return;
        }
        f(&mut *self.inner.state.lock());
        self.update();
    }

    /// Adds a child whose units count into this node.
    ///
    /// The child must not be an ancestor of this node.
    pub fn add_child(&self, child: &Self) {
        if self.is_closed() {
            return;
        }
        {
            let mut state = self.inner.state.lock();
            if !state.children.contains(child) {
                state.children.push(child.clone());
            }
        }
        {
            let own = Arc::as_ptr(&self.inner);
            let mut child_state = child.inner.state.lock();
            if !child_state.parents.iter().any(|p| p.as_ptr() == own) {
                child_state.parents.push(Arc::downgrade(&self.inner));
            }
        }
        self.update();
    }

    /// Removes a child.
    pub fn remove_child(&self, child: &Self) {
        self.inner.state.lock().children.retain(|c| c != child);
        {
            let own = Arc::as_ptr(&self.inner);
            child.inner.state.lock().parents.retain(|p| p.as_ptr() != own);
        }
        self.update();
    }

    /// Requests cancellation of this node and, one after another, of every
    /// child.
    ///
    /// Cancellation is advisory; in-flight work has to observe
    /// [`is_cancelled`](Self::is_cancelled).
    pub fn cancel(&self) -> BoxFuture<'static, Result<()>> {
        let node = self.clone();
        async move {
            if !node.mark_cancelled() {
                return Ok(());
            }
            debug!(progress = %node.name(), "cancel");
            node.emit(ProgressEvent::Cancelled).await?;
            for child in node.children() {
                child.cancel().await?;
            }
            node.update();
            Ok::<(), LifecycleError>(())
        }
        .boxed()
    }

    fn mark_cancelled(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.phase != Phase::Active || state.cancelled {
            return false;
        }
        state.cancelled = true;
        true
    }

    /// Clears the cancelled flag here and in every child.
    pub fn reset(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.phase != Phase::Active || !state.cancelled {
                return;
            }
            state.cancelled = false;
        }
        for child in self.children() {
            child.reset();
        }
        self.update();
    }

    fn update(&self) {
        if self.is_closed() {
            return;
        }
        fire_and_forget(
            ProgressEvent::Changed.as_str(),
            self.emit(ProgressEvent::Changed),
        );
        for parent in self.parents() {
            parent.update();
        }

        let cancelled = self.inner.state.lock().cancelled;
        if cancelled && self.inner.reset_on_finish && self.has_finished_work() {
            self.reset();
        }
    }

    fn parents(&self) -> Vec<Self> {
        self.inner
            .state
            .lock()
            .parents
            .iter()
            .filter_map(Weak::upgrade)
            .map(|inner| Self { inner })
            .collect()
    }

    /// Returns the children in insertion order.
    #[must_use]
    pub fn children(&self) -> Vec<Self> {
        self.inner.state.lock().children.clone()
    }

    /// Returns the number of direct children.
    #[must_use]
    pub fn get_children_count(&self) -> usize {
        self.inner.state.lock().children.len()
    }

    fn own_units(&self) -> (f64, f64, Vec<Self>) {
        let state = self.inner.state.lock();
        (state.total_units, state.completed_units, state.children.clone())
    }

    /// Total units including children; 0 when indeterminate.
    #[must_use]
    pub fn get_total_units(&self) -> f64 {
        let (total, _, children) = self.own_units();
        if total <= 0.0 && children.is_empty() {
            return 0.0;
        }
        total + children.iter().map(Self::get_total_units).sum::<f64>()
    }

    /// Completed units including children; 0 when indeterminate.
    #[must_use]
    pub fn get_completed_units(&self) -> f64 {
        let (total, completed, children) = self.own_units();
        if total <= 0.0 && children.is_empty() {
            return 0.0;
        }
        completed + children.iter().map(Self::get_completed_units).sum::<f64>()
    }

    /// Returns true when there is nothing to measure against.
    #[must_use]
    pub fn is_indeterminate(&self) -> bool {
        let state = self.inner.state.lock();
        state.total_units <= 0.0 && state.children.is_empty()
    }

    /// Returns true if cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.state.lock().cancelled
    }

    fn is_complete(&self) -> bool {
        !self.is_indeterminate() && self.get_completed_units() >= self.get_total_units()
    }

    /// Complete with at least one unit of measurable work.
    fn has_finished_work(&self) -> bool {
        let total = self.get_total_units();
        total > 0.0 && self.get_completed_units() >= total
    }

    /// Returns true once disposed or once every unit is completed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.is_disposed() || self.is_complete()
    }

    /// Returns true once [`dispose`](Self::dispose) finished releasing the
    /// tree.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().phase == Phase::Released
    }

    /// Returns true once disposal was requested.
    fn is_closed(&self) -> bool {
        self.inner.state.lock().phase != Phase::Active
    }

    /// Completion between 0 and 1.
    #[must_use]
    pub fn get_fraction(&self) -> f64 {
        if self.is_indeterminate() {
            return 0.0;
        }
        let total = self.get_total_units();
        if total <= 0.0 {
            return 0.0;
        }
        (self.get_completed_units() / total).clamp(0.0, 1.0)
    }

    /// Releases resources tracked on this node, disposes every child,
    /// detaches from all parents and notifies observers.
    ///
    /// Later calls do nothing, unless an earlier release was dropped before
    /// it started; that release is then run here.
    pub fn dispose(&self) -> BoxFuture<'static, Result<()>> {
        let resume = self.inner.state.lock().phase == Phase::Scheduled;
        let tracked = self.inner.tracker.dispose();
        if !resume {
            return tracked.into_future();
        }
        let node = self.clone();
        async move {
            tracked.await?;
            node.release_tree().await
        }
        .boxed()
    }

    fn schedule_release(&self) {
        let mut state = self.inner.state.lock();
        if state.phase == Phase::Active {
            state.phase = Phase::Scheduled;
        }
    }

    async fn release_tree(self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if matches!(state.phase, Phase::Releasing | Phase::Released) {
                return Ok(());
            }
            state.phase = Phase::Releasing;
        }
        debug!(progress = %self.name(), children = self.get_children_count(), "dispose");
        for child in self.children() {
            child.dispose().await?;
        }
        self.detach_from_parents();
        self.inner.state.lock().phase = Phase::Released;
        self.emit(ProgressEvent::Dispose).await
    }

    fn detach_from_parents(&self) {
        let parents: Vec<Weak<NodeInner>> = std::mem::take(&mut self.inner.state.lock().parents);
        for parent in parents.iter().filter_map(Weak::upgrade) {
            Self { inner: parent }.remove_child(self);
        }
    }

    /// Returns a serializable view of the tree.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let (total_units, completed_units, children) = self.own_units();
        ProgressSnapshot {
            id: self.id(),
            name: self.name().to_string(),
            total_units,
            completed_units,
            fraction: self.get_fraction(),
            cancelled: self.is_cancelled(),
            indeterminate: self.is_indeterminate(),
            children: children.iter().map(Self::snapshot).collect(),
        }
    }

    fn render(&self, indent: usize, lines: &mut Vec<String>) {
        let (total, completed, children) = self.own_units();
        #[allow(clippy::cast_possible_truncation)]
        let percent = (self.get_fraction() * 100.0).floor() as i64;
        lines.push(format!(
            "{}{}: {} of {} units, {} %, cancel={}",
            "  ".repeat(indent),
            self.name(),
            completed,
            total,
            percent,
            self.is_cancelled()
        ));
        for child in &children {
            child.render(indent + 1, lines);
        }
    }
}

impl Default for ProgressNode {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ProgressNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ProgressNode {}

impl Dispose for ProgressNode {
    fn dispose(&self) -> Completion {
        Completion::Pending(Self::dispose(self))
    }
}

impl std::fmt::Display for ProgressNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut lines = Vec::new();
        self.render(0, &mut lines);
        f.write_str(&lines.join("\n"))
    }
}

impl std::fmt::Debug for ProgressNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressNode")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("children", &self.get_children_count())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
