//! Resource release.
//!
//! This module provides:
//! - [`DisposalTracker`]: releases registered disposers newest first
//! - [`DeferQueue`]: runs queued steps in FIFO or LIFO order
//! - [`Disposer`]: the release callback or object stored by both
//! - [`Completion`]: the settled or pending result of a release
//! - Disposable timers and event listeners

mod completion;
mod defer;
mod disposer;
mod resources;
mod tracker;

pub use completion::Completion;
pub use defer::{DeferMode, DeferQueue};
pub use disposer::{AsyncDispose, Cleanup, Dispose, Disposer};
pub use resources::{
    use_event_listener, use_interval, use_timeout, EventSource, EventTarget, Listener,
    ListenerSource, Timer,
};
pub use tracker::{DisposalTracker, EntryId, TrackerConfig, Unregister};
