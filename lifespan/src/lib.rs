//! # Lifespan
//!
//! Lifetime management for asynchronous Rust code.
//!
//! Lifespan provides:
//!
//! - **Disposal tracking**: register release callbacks or disposable objects
//!   and release them newest first, synchronously or asynchronously
//! - **Deferred steps**: queue cleanup steps and run them in FIFO or LIFO order
//! - **Progress trees**: weighted units of work with cancellation, auto-reset
//!   and change notifications that bubble up to parents
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lifespan::prelude::*;
//!
//! let tracker = DisposalTracker::named("session");
//! tracker.track(Disposer::sync(|| println!("closing socket")));
//! tracker.track(Disposer::from_async(|| async { flush().await }));
//!
//! // Released newest first.
//! tracker.dispose().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod dispose;
pub mod errors;
pub mod events;
pub mod observability;
pub mod progress;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::dispose::{
        AsyncDispose, Cleanup, Completion, DeferMode, DeferQueue, DisposalTracker, Dispose,
        Disposer, TrackerConfig, Unregister,
    };
    pub use crate::errors::{LifecycleError, Result};
    pub use crate::events::Emitter;
    pub use crate::progress::{ProgressConfig, ProgressEvent, ProgressNode};
}
