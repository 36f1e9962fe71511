//! Outcome of a release that may or may not need awaiting.

use futures::future::{self, BoxFuture, FutureExt};
use std::future::{Future, IntoFuture};
use tracing::warn;

use crate::errors::{LifecycleError, Result};

/// The result of releasing a resource, running a step or emitting an event.
///
/// `Ready` means all side effects already happened. `Pending` carries work
/// that only completes once awaited.
pub enum Completion {
    /// Finished synchronously.
    Ready(Result<()>),
    /// Still in flight.
    Pending(BoxFuture<'static, Result<()>>),
}

impl Completion {
    /// A successful synchronous completion.
    #[must_use]
    pub const fn done() -> Self {
        Self::Ready(Ok(()))
    }

    /// A synchronous failure.
    #[must_use]
    pub fn failed(err: impl Into<LifecycleError>) -> Self {
        Self::Ready(Err(err.into()))
    }

    /// Wraps in-flight work.
    #[must_use]
    pub fn pending<F>(fut: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        Self::Pending(fut.boxed())
    }

    /// Returns true if awaiting is required.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Returns true if this finished synchronously without error.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Ready(Ok(())))
    }

    /// Converts into a synchronous result.
    ///
    /// A pending completion is a [`LifecycleError::SyncViolation`]; the
    /// in-flight work is dropped with it.
    pub fn into_sync(self, label: &str) -> Result<()> {
        match self {
            Self::Ready(result) => result,
            Self::Pending(_) => Err(LifecycleError::sync_violation(label)),
        }
    }

    /// Combines several completions into one.
    ///
    /// Every member is consumed. Pending members are awaited concurrently
    /// and the first rejection fails the whole join. A synchronous failure
    /// wins, but only after the pending members have settled.
    #[must_use]
    pub fn join(items: impl IntoIterator<Item = Self>) -> Self {
        let mut pending = Vec::new();
        let mut failure = None;
        for item in items {
            match item {
                Self::Ready(Ok(())) => {}
                Self::Ready(Err(err)) if failure.is_none() => failure = Some(err),
                Self::Ready(Err(err)) => {
                    warn!(error = %err, "Additional synchronous failure");
                }
                pending_item @ Self::Pending(_) => pending.push(pending_item),
            }
        }

        if let Some(err) = failure {
            return Self::fail_after(pending, err);
        }
        match pending.len() {
            0 => Self::done(),
            1 => pending.pop().unwrap_or_default(),
            _ => Self::pending(
                future::try_join_all(pending.into_iter().map(IntoFuture::into_future))
                    .map(|r| r.map(|_| ())),
            ),
        }
    }

    /// Settles `pending` and then fails with `err`.
    ///
    /// Rejections among `pending` are logged, `err` is what gets reported.
    pub(crate) fn fail_after(pending: Vec<Self>, err: LifecycleError) -> Self {
        let pending: Vec<_> = pending
            .into_iter()
            .filter(Self::is_pending)
            .map(IntoFuture::into_future)
            .collect();
        if pending.is_empty() {
            return Self::failed(err);
        }
        Self::pending(async move {
            for result in future::join_all(pending).await {
                if let Err(rejected) = result {
                    warn!(error = %rejected, "Release rejected while another release failed");
                }
            }
            Err::<(), _>(err)
        })
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::done()
    }
}

impl From<Result<()>> for Completion {
    fn from(result: Result<()>) -> Self {
        Self::Ready(result)
    }
}

impl IntoFuture for Completion {
    type Output = Result<()>;
    type IntoFuture = BoxFuture<'static, Result<()>>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Self::Ready(result) => future::ready(result).boxed(),
            Self::Pending(fut) => fut,
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}
