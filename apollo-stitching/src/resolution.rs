use std::fmt;
use std::future::Future;
use std::future::IntoFuture;

use futures::FutureExt;
use futures::future;
use futures::future::BoxFuture;

/// The outcome of a resolver or delegated call: either available right away, or pending.
///
/// Services answering from memory (or from a batch that already completed) return
/// [`Resolution::Ready`], so that type merging can fold their data without suspending. Anything
/// else is [`Resolution::Pending`]. Awaiting a `Resolution` works in both cases.
pub enum Resolution<T> {
    Ready(T),
    Pending(BoxFuture<'static, T>),
}

impl<T> Resolution<T>
where
    T: Send + 'static,
{
    /// Wrap a future as a pending resolution.
    pub fn pending(future: impl Future<Output = T> + Send + 'static) -> Self {
        Resolution::Pending(future.boxed())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Resolution::Ready(_))
    }

    /// Returns the value if it is available without waiting.
    pub fn ready(self) -> Result<T, Self> {
        match self {
            Resolution::Ready(value) => Ok(value),
            pending => Err(pending),
        }
    }

    pub fn map<U, F>(self, f: F) -> Resolution<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        match self {
            Resolution::Ready(value) => Resolution::Ready(f(value)),
            Resolution::Pending(future) => Resolution::Pending(future.map(f).boxed()),
        }
    }
}

impl<T> IntoFuture for Resolution<T>
where
    T: Send + 'static,
{
    type Output = T;
    type IntoFuture = BoxFuture<'static, T>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Resolution::Ready(value) => future::ready(value).boxed(),
            Resolution::Pending(future) => future,
        }
    }
}

impl<T> From<T> for Resolution<T> {
    fn from(value: T) -> Self {
        Resolution::Ready(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Resolution<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Resolution::Pending(_) => f.write_str("Pending"),
        }
    }
}
