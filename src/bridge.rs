//! Conversions between [`Pending`] results and the deferred container types.
//!
//! Values and failures cross the bridge unchanged: a failure observed on one side is the same
//! [`CallError`] on the other.

use crate::error::CallError;
use crate::pending::{self, Pending};
use crate::types::EXCEPTION;
use crate::value::{Deferred, Effect, ElementStream, Eval, Flow, Job, Sequence, Value};
use tokio::runtime::Handle;

/// Start `pending` as a task whose value can be awaited.
///
/// Without a current tokio runtime the task fails with [`CallError::Interrupted`].
pub fn deferred(pending: Pending<Value>) -> Deferred {
    Deferred::spawn(pending)
}

/// Start `pending` as a task, keeping only its completion.
pub fn job<T: Send + 'static>(pending: Pending<T>) -> Job {
    Job::spawn(pending)
}

/// Wait for `pending` only when the value is first forced.
pub fn lazy(pending: Pending<Value>) -> Eval {
    Eval::later(move || pending)
}

/// Run a blocking closure on the blocking pool.
///
/// An `Err`, a panic or a missing tokio runtime becomes a failed result; nothing is raised
/// synchronously.
pub fn blocking<T, F>(f: F) -> Pending<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CallError> + Send + 'static,
{
    pending::from_future(async move {
        let runtime = Handle::try_current().map_err(|error| {
            CallError::Interrupted(format!("no tokio runtime to spawn on: {error}"))
        })?;
        match runtime.spawn_blocking(f).await {
            Ok(result) => result,
            Err(error) => {
                tracing::debug!(%error, "blocking task did not complete");
                Err(error.into())
            }
        }
    })
}

pub fn sequence(elements: ElementStream) -> Sequence {
    Sequence::new(elements)
}

pub fn flow(elements: ElementStream) -> Flow {
    Flow::new(elements)
}

/// Suspend `pending` as an effect whose left side is any exception.
pub fn effect(pending: Pending<Value>) -> Effect {
    Effect::new(&EXCEPTION, pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{INTERRUPTED, IO_ERROR};
    use crate::pending::{done, failed};
    use futures::StreamExt;
    use serde_json::json;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn io_failure() -> CallError {
        CallError::transport(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"))
    }

    #[tokio::test]
    async fn deferred_yields_value_or_failure_unchanged() {
        let value = deferred(done(Value::from(json!("tabby")))).await.unwrap();
        assert_eq!(value.as_data(), Some(&json!("tabby")));

        let err = deferred(failed(io_failure())).join().await.unwrap_err();
        assert!(err.is_instance_of(&IO_ERROR));
        assert_eq!(err.to_string(), "transport failure: pipe");
    }

    #[tokio::test]
    async fn aborted_deferred_is_interrupted() {
        let task = deferred(pending::from_future(futures::future::pending()));
        task.abort();
        let err = task.join().await.unwrap_err();
        assert!(err.is_instance_of(&INTERRUPTED));
    }

    #[tokio::test]
    async fn job_discards_the_value() {
        job(done(7_u8)).join().await.unwrap();
        assert!(job(failed::<u8>(CallError::EmptyCollection)).await.is_err());
    }

    #[tokio::test]
    async fn lazy_waits_until_forced() {
        let polls = Arc::new(AtomicUsize::new(0));
        let seen = polls.clone();
        let mut eval = lazy(pending::from_future(async move {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Unit)
        }));
        assert_eq!(polls.load(Ordering::SeqCst), 0);

        eval.force().await.unwrap();
        eval.force().await.unwrap();
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blocking_failures_arrive_asynchronously() {
        let value = blocking(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(value, 42);

        let err = blocking::<u8, _>(|| Err(io_failure())).await.unwrap_err();
        assert!(err.is_instance_of(&IO_ERROR));

        let err = blocking::<u8, _>(|| panic!("claws out")).await.unwrap_err();
        assert!(err.is_instance_of(&INTERRUPTED));
    }

    #[test]
    fn tasks_outside_a_runtime_fail_instead_of_panicking() {
        use futures::executor::block_on;

        let err = block_on(deferred(done(Value::Unit))).unwrap_err();
        assert!(err.is_instance_of(&INTERRUPTED));
        assert!(block_on(job(done(1_u8))).unwrap_err().is_instance_of(&INTERRUPTED));
        assert!(block_on(blocking(|| Ok(1_u8))).unwrap_err().is_instance_of(&INTERRUPTED));
    }

    #[tokio::test]
    async fn sequences_and_flows_keep_element_order() {
        let elements = || -> ElementStream {
            Box::new((1..=3).map(|n| Value::from(json!(n))))
        };
        let from_sequence: Vec<_> =
            sequence(elements()).filter_map(|v| v.as_data().cloned()).collect();
        let from_flow: Vec<_> =
            flow(elements()).filter_map(|v| async move { v.as_data().cloned() }).collect().await;
        assert_eq!(from_sequence, vec![json!(1), json!(2), json!(3)]);
        assert_eq!(from_flow, from_sequence);
    }

    #[tokio::test]
    async fn effect_catches_exceptions_only() {
        let left = effect(failed(io_failure())).into_either().await.unwrap();
        assert!(left.left().is_some_and(|e| e.is_instance_of(&IO_ERROR)));

        let interrupted = effect(failed(CallError::Interrupted("stop".into()))).into_either().await;
        assert!(interrupted.is_err());

        let right = effect(done(Value::Unit)).into_either().await.unwrap();
        assert!(right.is_right());
    }
}
