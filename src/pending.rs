//! The pending-result primitive every pipeline stage consumes and produces.
//!
//! A [`Pending`] is a boxed, `'static` future resolving to `Result<T, CallError>`. Nothing runs
//! until it is polled, so stages compose by wrapping futures rather than by registering callbacks.

use crate::error::CallError;
use futures::future::{self, BoxFuture, FutureExt};
use std::future::Future;

/// An asynchronous result that either completes with a value or fails with a [`CallError`].
pub type Pending<T> = BoxFuture<'static, Result<T, CallError>>;

/// An already-completed successful result.
pub fn done<T: Send + 'static>(value: T) -> Pending<T> {
    future::ready(Ok(value)).boxed()
}

/// An already-completed failure.
pub fn failed<T: Send + 'static>(error: CallError) -> Pending<T> {
    future::ready(Err(error)).boxed()
}

pub fn from_result<T: Send + 'static>(result: Result<T, CallError>) -> Pending<T> {
    future::ready(result).boxed()
}

/// Box an async block, pinning its output type to `Result<T, CallError>`.
pub fn from_future<T, F>(future: F) -> Pending<T>
where
    F: Future<Output = Result<T, CallError>> + Send + 'static,
{
    future.boxed()
}

/// Continuation combinators on [`Pending`].
///
/// Every continuation runs strictly after the wrapped stage completes and at most once.
pub trait PendingExt<T>: Sized {
    /// Map a successful value.
    fn transform<U, F>(self, f: F) -> Pending<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static;

    /// Chain another pending computation onto a successful value.
    fn bind<U, F>(self, f: F) -> Pending<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Pending<U> + Send + 'static;

    /// Observe a success without changing it.
    fn on_success<F>(self, f: F) -> Pending<T>
    where
        F: FnOnce(&T) + Send + 'static;

    /// Observe a failure without changing it.
    fn on_failure<F>(self, f: F) -> Pending<T>
    where
        F: FnOnce(&CallError) + Send + 'static;

    /// Replace a failure accepted by `predicate` with a value; other failures pass through.
    fn recover<P, F>(self, predicate: P, f: F) -> Pending<T>
    where
        P: FnOnce(&CallError) -> bool + Send + 'static,
        F: FnOnce(CallError) -> T + Send + 'static;

    /// Wait for both results, failing with the first failure observed.
    fn zip<U: Send + 'static>(self, other: Pending<U>) -> Pending<(T, U)>;
}

impl<T: Send + 'static> PendingExt<T> for Pending<T> {
    fn transform<U, F>(self, f: F) -> Pending<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.map(|result| result.map(f)).boxed()
    }

    fn bind<U, F>(self, f: F) -> Pending<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Pending<U> + Send + 'static,
    {
        from_future(async move { f(self.await?).await })
    }

    fn on_success<F>(self, f: F) -> Pending<T>
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.inspect(|result| {
            if let Ok(value) = result {
                f(value);
            }
        })
        .boxed()
    }

    fn on_failure<F>(self, f: F) -> Pending<T>
    where
        F: FnOnce(&CallError) + Send + 'static,
    {
        self.inspect(|result| {
            if let Err(error) = result {
                f(error);
            }
        })
        .boxed()
    }

    fn recover<P, F>(self, predicate: P, f: F) -> Pending<T>
    where
        P: FnOnce(&CallError) -> bool + Send + 'static,
        F: FnOnce(CallError) -> T + Send + 'static,
    {
        self.map(|result| match result {
            Err(error) => {
                if predicate(&error) {
                    Ok(f(error))
                } else {
                    Err(error)
                }
            }
            ok => ok,
        })
        .boxed()
    }

    fn zip<U: Send + 'static>(self, other: Pending<U>) -> Pending<(T, U)> {
        future::try_join(self, other).boxed()
    }
}
