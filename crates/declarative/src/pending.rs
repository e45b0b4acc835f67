//! Pending values used as `depends_on` inputs.
//!
//! A [`Pending`] is a shareable handle to a value that settles later: the
//! output of another declared resource, or any externally supplied future.
//! Every holder observes the same result, success or failure.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;

use crate::error::{Error, Result};

/// The `(scope, identity)` a pending value resolves the output of.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    /// Store key of the scope
    pub scope: String,
    /// Identity within the scope
    pub identity: String,
}

/// A value that will settle later.
///
/// Clones share one underlying future; it is driven by whichever holder
/// awaits it first.
pub struct Pending<T: Clone> {
    future: Shared<BoxFuture<'static, Result<T>>>,
    target: Option<Target>,
}

impl<T> Pending<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wrap any future as a pending value.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            future: future.boxed().shared(),
            target: None,
        }
    }

    /// A value that is already available.
    pub fn ready(value: T) -> Self {
        Self::new(futures::future::ready(Ok(value)))
    }

    /// A value that has already failed.
    pub fn failed(error: Error) -> Self {
        Self::new(futures::future::ready(Err(error)))
    }

    /// Run a future on the tokio runtime and track its result.
    ///
    /// The work starts immediately, whether or not anything awaits it.
    /// A panic or cancellation settles as [`Error::Aborted`].
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        Self::new(async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(Error::Aborted(e.to_string())),
            }
        })
    }

    pub(crate) fn with_target(mut self, scope: &str, identity: &str) -> Self {
        self.target = Some(Target {
            scope: scope.to_string(),
            identity: identity.to_string(),
        });
        self
    }

    /// Wait for the value.
    pub async fn settle(&self) -> Result<T> {
        self.future.clone().await
    }

    /// The settled result, if it is already available.
    pub fn peek(&self) -> Option<Result<T>> {
        self.future.peek().cloned()
    }

    /// The resource this value is the output of, if any.
    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }
}

impl<T: Clone> Clone for Pending<T> {
    fn clone(&self) -> Self {
        Self {
            future: self.future.clone(),
            target: self.target.clone(),
        }
    }
}

impl<T: Clone> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// An ordering edge: something that must settle before a handler runs.
///
/// Carries no ownership of the resource it points at.
pub struct Dependency {
    pub(crate) target: Option<Target>,
    pub(crate) future: BoxFuture<'static, Result<()>>,
}

impl Dependency {
    /// Depend on an arbitrary future.
    pub fn from_future<F, T>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            target: None,
            future: async move { future.await.map(|_| ()) }.boxed(),
        }
    }

    /// The resource this edge points at, if any.
    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl<T> From<Pending<T>> for Dependency
where
    T: Clone + Send + Sync + 'static,
{
    fn from(pending: Pending<T>) -> Self {
        Self {
            target: pending.target.clone(),
            future: async move { pending.settle().await.map(|_| ()) }.boxed(),
        }
    }
}

impl<T> From<&Pending<T>> for Dependency
where
    T: Clone + Send + Sync + 'static,
{
    fn from(pending: &Pending<T>) -> Self {
        pending.clone().into()
    }
}
