//! Disposable shapes, resolved once at registration time.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;

use super::Completion;
use crate::errors::{LifecycleError, Result};

/// A resource that knows how to release itself.
pub trait Dispose: Send + Sync {
    /// Releases the resource.
    fn dispose(&self) -> Completion;
}

/// A resource whose release is always asynchronous.
#[async_trait]
pub trait AsyncDispose: Send + Sync {
    /// Releases the resource.
    async fn dispose(&self) -> anyhow::Result<()>;
}

/// Legacy release capability.
///
/// Types that implement both this and [`Dispose`] should be registered with
/// [`Disposer::object`].
pub trait Cleanup: Send + Sync {
    /// Releases the resource.
    fn cleanup(&self) -> Completion;
}

type Callback = Box<dyn FnOnce() -> Completion + Send>;

enum DisposerKind {
    Callback(Callback),
    Pending(BoxFuture<'static, Result<()>>),
    Object(Arc<dyn Dispose>),
    AsyncObject(Arc<dyn AsyncDispose>),
    Cleanup(Arc<dyn Cleanup>),
}

impl DisposerKind {
    const fn name(&self) -> &'static str {
        match self {
            Self::Callback(_) => "callback",
            Self::Pending(_) => "pending",
            Self::Object(_) => "object",
            Self::AsyncObject(_) => "async-object",
            Self::Cleanup(_) => "cleanup",
        }
    }
}

/// Anything that can be tracked and released exactly once.
pub struct Disposer {
    label: Option<String>,
    kind: DisposerKind,
}

impl Disposer {
    fn new(kind: DisposerKind) -> Self {
        Self { label: None, kind }
    }

    /// A callable that may finish synchronously or hand back in-flight work.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce() -> Completion + Send + 'static,
    {
        Self::new(DisposerKind::Callback(Box::new(f)))
    }

    /// An infallible synchronous callable.
    pub fn sync<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::from_fn(move || {
            f();
            Completion::done()
        })
    }

    /// A fallible synchronous callable.
    pub fn try_sync<F>(f: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self::from_fn(move || Completion::from(f().map_err(LifecycleError::from)))
    }

    /// A callable returning a future.
    ///
    /// The callable runs when the disposer is released; only the returned
    /// future is awaited later.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::from_fn(move || {
            let fut = f();
            Completion::pending(async move { fut.await.map_err(LifecycleError::from) })
        })
    }

    /// An operation that is already in flight.
    pub fn pending<Fut>(fut: Fut) -> Self
    where
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(DisposerKind::Pending(
            async move { fut.await.map_err(LifecycleError::from) }.boxed(),
        ))
    }

    /// Work already in flight, carried as produced by a release.
    pub(crate) fn in_flight(fut: BoxFuture<'static, Result<()>>) -> Self {
        Self::new(DisposerKind::Pending(fut))
    }

    /// An object exposing [`Dispose`].
    pub fn object(obj: Arc<dyn Dispose>) -> Self {
        Self::new(DisposerKind::Object(obj))
    }

    /// An object exposing [`AsyncDispose`].
    pub fn async_object(obj: Arc<dyn AsyncDispose>) -> Self {
        Self::new(DisposerKind::AsyncObject(obj))
    }

    /// An object exposing the legacy [`Cleanup`] capability.
    pub fn cleanup(obj: Arc<dyn Cleanup>) -> Self {
        Self::new(DisposerKind::Cleanup(obj))
    }

    /// Attaches a diagnostic label.
    #[must_use]
    pub fn named(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Returns the diagnostic label, falling back to the shape name.
    #[must_use]
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or_else(|| self.kind.name())
    }

    /// Returns true for the shapes a deferred step may take.
    pub(crate) const fn is_step(&self) -> bool {
        matches!(
            self.kind,
            DisposerKind::Callback(_) | DisposerKind::Pending(_)
        )
    }

    /// Returns true if this wraps exactly `obj`.
    pub(crate) fn is_object(&self, obj: &Arc<dyn Dispose>) -> bool {
        match &self.kind {
            DisposerKind::Object(own) => {
                Arc::as_ptr(own).cast::<()>() == Arc::as_ptr(obj).cast::<()>()
            }
            _ => false,
        }
    }

    /// Runs the release procedure, consuming the disposer.
    pub(crate) fn release(self) -> Completion {
        match self.kind {
            DisposerKind::Callback(f) => f(),
            DisposerKind::Pending(fut) => Completion::Pending(fut),
            DisposerKind::Object(obj) => obj.dispose(),
            DisposerKind::AsyncObject(obj) => {
                Completion::pending(async move { obj.dispose().await.map_err(LifecycleError::from) })
            }
            DisposerKind::Cleanup(obj) => obj.cleanup(),
        }
    }
}

impl From<Arc<dyn Dispose>> for Disposer {
    fn from(obj: Arc<dyn Dispose>) -> Self {
        Self::object(obj)
    }
}

impl std::fmt::Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer")
            .field("label", &self.label)
            .field("kind", &self.kind.name())
            .finish()
    }
}
