//! Hierarchical progress tracking.
//!
//! A [`ProgressNode`] counts its own units of work plus those of its
//! children, propagates cancellation down the tree and change notifications
//! up the tree, and releases its subtree through its own
//! [`DisposalTracker`](crate::dispose::DisposalTracker).

mod config;
mod node;

pub use config::{ProgressConfig, ProgressEvent};
pub use node::{ProgressNode, ProgressSnapshot};
