//! Dynamic stage outputs and the containers adapters wrap them in.
//!
//! Adapters are selected at runtime from the declared [`Type`](crate::types::Type), so a pipeline
//! cannot be typed statically end to end. Each stage hands the next a [`Value`]; callers unwrap
//! the container they declared with the `into_*` accessors.

use crate::error::CallError;
use crate::pending::Pending;
use crate::types::{Class, Type};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// A single-pass source of elements.
pub type ElementStream = Box<dyn Iterator<Item = Value> + Send>;

/// Output of a pipeline stage.
pub enum Value {
    /// Completed without a value.
    Unit,
    /// The body was empty.
    Absent,
    Data(serde_json::Value),
    /// A failure folded into a container.
    Error(CallError),
    List(Vec<Value>),
    Stream(ElementStream),
    Either(Box<Either<Value, Value>>),
    Option(Option<Box<Value>>),
    NonEmpty(NonEmptyList<Value>),
    Eval(Box<Eval>),
    Effect(Effect),
    Sequence(Sequence),
    Flow(Flow),
    Deferred(Deferred),
    Job(Job),
}

impl Value {
    pub fn left(value: Value) -> Self {
        Value::Either(Box::new(Either::Left(value)))
    }

    pub fn right(value: Value) -> Self {
        Value::Either(Box::new(Either::Right(value)))
    }

    pub fn some(value: Value) -> Self {
        Value::Option(Some(Box::new(value)))
    }

    pub fn none() -> Self {
        Value::Option(None)
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Absent => "absent",
            Value::Data(_) => "data",
            Value::Error(_) => "error",
            Value::List(_) => "list",
            Value::Stream(_) => "stream",
            Value::Either(_) => "either",
            Value::Option(_) => "option",
            Value::NonEmpty(_) => "non-empty list",
            Value::Eval(_) => "eval",
            Value::Effect(_) => "effect",
            Value::Sequence(_) => "sequence",
            Value::Flow(_) => "flow",
            Value::Deferred(_) => "deferred",
            Value::Job(_) => "job",
        }
    }

    /// True for an empty body or an explicit JSON `null`.
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent | Value::Data(serde_json::Value::Null))
    }

    pub fn as_data(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Data(data) => Some(data),
            _ => None,
        }
    }

    /// Decode `Data` into a typed value. Absent bodies decode as JSON `null`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, CallError> {
        let data = match self {
            Value::Data(data) => data.clone(),
            Value::Absent | Value::Unit => serde_json::Value::Null,
            other => return Err(unexpected("data", other)),
        };
        serde_json::from_value(data).map_err(|e| {
            CallError::decode("application/json", &Type::any(), e)
        })
    }

    /// Normalize a collection-shaped value into its elements. Absent bodies are empty.
    pub fn into_list(self) -> Result<Vec<Value>, CallError> {
        match self {
            Value::List(items) => Ok(items),
            Value::Absent | Value::Data(serde_json::Value::Null) => Ok(Vec::new()),
            Value::Data(serde_json::Value::Array(items)) => {
                Ok(items.into_iter().map(Value::Data).collect())
            }
            Value::Stream(elements) => Ok(elements.collect()),
            Value::NonEmpty(items) => Ok(items.into_vec()),
            other => Err(unexpected("list", &other)),
        }
    }

    /// Elements as a single-pass stream; collections are streamed in order.
    pub fn into_stream(self) -> Result<ElementStream, CallError> {
        match self {
            Value::Stream(elements) => Ok(elements),
            other => Ok(Box::new(other.into_list()?.into_iter())),
        }
    }

    pub fn into_either(self) -> Result<Either<Value, Value>, CallError> {
        match self {
            Value::Either(either) => Ok(*either),
            other => Err(unexpected("either", &other)),
        }
    }

    pub fn into_option(self) -> Result<Option<Value>, CallError> {
        match self {
            Value::Option(option) => Ok(option.map(|v| *v)),
            other => Err(unexpected("option", &other)),
        }
    }

    pub fn into_non_empty(self) -> Result<NonEmptyList<Value>, CallError> {
        match self {
            Value::NonEmpty(items) => Ok(items),
            other => Err(unexpected("non-empty list", &other)),
        }
    }

    pub fn into_eval(self) -> Result<Eval, CallError> {
        match self {
            Value::Eval(eval) => Ok(*eval),
            other => Err(unexpected("eval", &other)),
        }
    }

    pub fn into_effect(self) -> Result<Effect, CallError> {
        match self {
            Value::Effect(effect) => Ok(effect),
            other => Err(unexpected("effect", &other)),
        }
    }

    pub fn into_sequence(self) -> Result<Sequence, CallError> {
        match self {
            Value::Sequence(sequence) => Ok(sequence),
            other => Err(unexpected("sequence", &other)),
        }
    }

    pub fn into_flow(self) -> Result<Flow, CallError> {
        match self {
            Value::Flow(flow) => Ok(flow),
            other => Err(unexpected("flow", &other)),
        }
    }

    pub fn into_deferred(self) -> Result<Deferred, CallError> {
        match self {
            Value::Deferred(deferred) => Ok(deferred),
            other => Err(unexpected("deferred", &other)),
        }
    }

    pub fn into_job(self) -> Result<Job, CallError> {
        match self {
            Value::Job(job) => Ok(job),
            other => Err(unexpected("job", &other)),
        }
    }
}

pub(crate) fn unexpected(expected: &'static str, found: &Value) -> CallError {
    CallError::UnexpectedValue { expected, found: found.kind() }
}

impl From<serde_json::Value> for Value {
    fn from(data: serde_json::Value) -> Self {
        Value::Data(data)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("Unit"),
            Value::Absent => f.write_str("Absent"),
            Value::Data(data) => f.debug_tuple("Data").field(data).finish(),
            Value::Error(error) => f.debug_tuple("Error").field(error).finish(),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Either(either) => f.debug_tuple("Either").field(either).finish(),
            Value::Option(option) => f.debug_tuple("Option").field(option).finish(),
            Value::NonEmpty(items) => f.debug_tuple("NonEmpty").field(items).finish(),
            Value::Eval(eval) => fmt::Debug::fmt(eval, f),
            Value::Effect(effect) => fmt::Debug::fmt(effect, f),
            Value::Deferred(deferred) => fmt::Debug::fmt(deferred, f),
            Value::Job(job) => fmt::Debug::fmt(job, f),
            other => write!(f, "{}(..)", other.kind()),
        }
    }
}

/// A value that is either a `Left` (by convention a failure) or a `Right`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Either<L, R> {
    Left(L),
    Right(R),
}

impl<L, R> Either<L, R> {
    pub fn is_left(&self) -> bool {
        matches!(self, Either::Left(_))
    }

    pub fn is_right(&self) -> bool {
        matches!(self, Either::Right(_))
    }

    pub fn left(self) -> Option<L> {
        match self {
            Either::Left(l) => Some(l),
            Either::Right(_) => None,
        }
    }

    pub fn right(self) -> Option<R> {
        match self {
            Either::Left(_) => None,
            Either::Right(r) => Some(r),
        }
    }

    pub fn fold<T>(self, on_left: impl FnOnce(L) -> T, on_right: impl FnOnce(R) -> T) -> T {
        match self {
            Either::Left(l) => on_left(l),
            Either::Right(r) => on_right(r),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(R) -> U) -> Either<L, U> {
        match self {
            Either::Left(l) => Either::Left(l),
            Either::Right(r) => Either::Right(f(r)),
        }
    }

    pub fn map_left<U>(self, f: impl FnOnce(L) -> U) -> Either<U, R> {
        match self {
            Either::Left(l) => Either::Left(f(l)),
            Either::Right(r) => Either::Right(r),
        }
    }

    pub fn as_ref(&self) -> Either<&L, &R> {
        match self {
            Either::Left(l) => Either::Left(l),
            Either::Right(r) => Either::Right(r),
        }
    }
}

impl<L, R> From<Result<R, L>> for Either<L, R> {
    fn from(result: Result<R, L>) -> Self {
        match result {
            Ok(r) => Either::Right(r),
            Err(l) => Either::Left(l),
        }
    }
}

/// A list holding at least one element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyList<T> {
    items: Vec<T>,
}

impl<T> NonEmptyList<T> {
    pub fn new(head: T, tail: Vec<T>) -> Self {
        let mut items = Vec::with_capacity(tail.len() + 1);
        items.push(head);
        items.extend(tail);
        Self { items }
    }

    /// `None` when `items` is empty.
    pub fn from_vec(items: Vec<T>) -> Option<Self> {
        if items.is_empty() {
            None
        } else {
            Some(Self { items })
        }
    }

    pub fn head(&self) -> &T {
        // non-empty by construction
        &self.items[0]
    }

    pub fn tail(&self) -> &[T] {
        &self.items[1..]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always false.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T> IntoIterator for NonEmptyList<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a NonEmptyList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

type Thunk = Box<dyn FnOnce() -> Pending<Value> + Send>;

enum EvalState {
    Later(Thunk),
    Running,
    Done(Result<Value, CallError>),
}

/// A lazily computed value. The computation runs once, on the first [`Eval::force`].
///
/// A failed computation is memoized too: every later force returns a clone of the same error,
/// sharing its underlying source.
pub struct Eval {
    state: EvalState,
}

impl Eval {
    /// An already evaluated value.
    pub fn now(value: Value) -> Self {
        Self { state: EvalState::Done(Ok(value)) }
    }

    /// Defer `f` until the value is first forced.
    pub fn later<F>(f: F) -> Self
    where
        F: FnOnce() -> Pending<Value> + Send + 'static,
    {
        Self { state: EvalState::Later(Box::new(f)) }
    }

    pub fn is_forced(&self) -> bool {
        matches!(self.state, EvalState::Done(_))
    }

    /// Run the computation if it has not run yet and borrow its result.
    ///
    /// If a previous force was dropped before completing, the computation is lost and this
    /// returns [`CallError::Interrupted`].
    pub async fn force(&mut self) -> Result<&Value, CallError> {
        if matches!(self.state, EvalState::Later(_)) {
            if let EvalState::Later(thunk) = std::mem::replace(&mut self.state, EvalState::Running)
            {
                let outcome = thunk().await;
                self.state = EvalState::Done(outcome);
            }
        }
        match &self.state {
            EvalState::Done(Ok(value)) => Ok(value),
            EvalState::Done(Err(error)) => Err(error.clone()),
            _ => Err(cancelled()),
        }
    }

    /// Force and take ownership of the result.
    pub async fn into_value(mut self) -> Result<Value, CallError> {
        self.force().await?;
        match self.state {
            EvalState::Done(result) => result,
            _ => Err(cancelled()),
        }
    }
}

fn cancelled() -> CallError {
    CallError::Interrupted("evaluation was cancelled before it completed".into())
}

impl fmt::Debug for Eval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            EvalState::Later(_) => f.write_str("Eval(<later>)"),
            EvalState::Running => f.write_str("Eval(<running>)"),
            EvalState::Done(result) => f.debug_tuple("Eval").field(result).finish(),
        }
    }
}

/// A suspended computation whose failures of class `left` are typed results.
///
/// Nothing runs until the effect is consumed; consuming it runs the call once.
pub struct Effect {
    left: &'static Class,
    pending: Pending<Value>,
}

impl Effect {
    pub fn new(left: &'static Class, pending: Pending<Value>) -> Self {
        Self { left, pending }
    }

    /// Class of failures folded into `Left`.
    pub fn left_class(&self) -> &'static Class {
        self.left
    }

    /// Run the computation. Failures of the left class become `Left`; others propagate.
    pub async fn into_either(self) -> Result<Either<CallError, Value>, CallError> {
        match self.pending.await {
            Ok(value) => Ok(Either::Right(value)),
            Err(error) if error.is_instance_of(self.left) => Ok(Either::Left(error)),
            Err(error) => Err(error),
        }
    }

    pub async fn fold<T>(
        self,
        on_left: impl FnOnce(CallError) -> T,
        on_right: impl FnOnce(Value) -> T,
    ) -> Result<T, CallError> {
        Ok(self.into_either().await?.fold(on_left, on_right))
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect").field("left", &self.left.name()).finish_non_exhaustive()
    }
}

/// Lazy single-pass sequence over the elements of one call's response.
pub struct Sequence {
    elements: ElementStream,
}

impl Sequence {
    pub fn new(elements: ElementStream) -> Self {
        Self { elements }
    }
}

impl Iterator for Sequence {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        self.elements.next()
    }
}

/// Asynchronous stream over the elements of one call's response.
pub struct Flow {
    elements: BoxStream<'static, Value>,
}

impl Flow {
    pub fn new(elements: ElementStream) -> Self {
        Self { elements: stream::iter(elements).boxed() }
    }
}

impl Stream for Flow {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        self.elements.poll_next_unpin(cx)
    }
}

/// A spawned task, or the failure to spawn it when no tokio runtime was current.
#[derive(Debug)]
enum Task<T> {
    Running(JoinHandle<Result<T, CallError>>),
    Unstarted(Option<CallError>),
}

impl<T: Send + 'static> Task<T> {
    fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, CallError>> + Send + 'static,
    {
        match Handle::try_current() {
            Ok(handle) => Task::Running(handle.spawn(future)),
            Err(error) => {
                tracing::warn!(%error, "no tokio runtime, task not started");
                Task::Unstarted(Some(CallError::Interrupted(format!(
                    "no tokio runtime to spawn on: {error}"
                ))))
            }
        }
    }

    fn abort(&self) {
        if let Task::Running(handle) = self {
            handle.abort();
        }
    }

    fn is_finished(&self) -> bool {
        match self {
            Task::Running(handle) => handle.is_finished(),
            Task::Unstarted(_) => true,
        }
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T, CallError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut() {
            Task::Running(handle) => {
                Pin::new(handle).poll(cx).map(|joined| joined.unwrap_or_else(|e| Err(e.into())))
            }
            Task::Unstarted(error) => Poll::Ready(Err(error
                .take()
                .unwrap_or_else(|| CallError::Interrupted("task polled after completion".into())))),
        }
    }
}

/// A running task producing one value.
///
/// Awaiting yields the task's value or failure unchanged; a cancelled or panicked task surfaces
/// as [`CallError::Interrupted`]. Spawning without a current tokio runtime yields a task that
/// fails with [`CallError::Interrupted`].
#[derive(Debug)]
pub struct Deferred {
    task: Task<Value>,
}

impl Deferred {
    /// Start `pending` on the current tokio runtime.
    pub fn spawn(pending: Pending<Value>) -> Self {
        Self { task: Task::spawn(pending) }
    }

    pub async fn join(self) -> Result<Value, CallError> {
        self.task.await
    }

    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Future for Deferred {
    type Output = Result<Value, CallError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.task).poll(cx)
    }
}

/// A running task whose value is discarded.
#[derive(Debug)]
pub struct Job {
    task: Task<()>,
}

impl Job {
    /// Start `pending` on the current tokio runtime.
    pub fn spawn<T: Send + 'static>(pending: Pending<T>) -> Self {
        Self { task: Task::spawn(async move { pending.await.map(|_| ()) }) }
    }

    pub async fn join(self) -> Result<(), CallError> {
        self.task.await
    }

    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Future for Job {
    type Output = Result<(), CallError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.task).poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IO_ERROR;
    use crate::pending::{done, failed};
    use crate::types::EXCEPTION;
    use futures::FutureExt;
    use serde_json::json;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn into_list_normalizes_collections() {
        let items = Value::from(json!([1, 2, 3])).into_list().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[2].as_data(), Some(&json!(3)));

        assert!(Value::Absent.into_list().unwrap().is_empty());
        let err = Value::from(json!({"a": 1})).into_list().unwrap_err();
        assert!(matches!(err, CallError::UnexpectedValue { expected: "list", found: "data" }));
    }

    #[test]
    fn deserialize_typed_data() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Cat {
            name: String,
            lives: u8,
        }
        let cat: Cat = Value::from(json!({"name": "Tom", "lives": 9})).deserialize().unwrap();
        assert_eq!(cat, Cat { name: "Tom".into(), lives: 9 });
        assert!(Value::List(vec![]).deserialize::<Cat>().is_err());
    }

    #[test]
    fn non_empty_list_rejects_empty_input() {
        assert!(NonEmptyList::<u8>::from_vec(vec![]).is_none());
        let list = NonEmptyList::from_vec(vec![1, 2, 3]).unwrap();
        assert_eq!(*list.head(), 1);
        assert_eq!(list.tail(), &[2, 3]);
        assert_eq!(list.len(), 3);
        assert_eq!(NonEmptyList::new(0, vec![1]).into_vec(), vec![0, 1]);
    }

    #[test]
    fn either_combinators() {
        let right: Either<&str, u8> = Either::Right(2);
        assert_eq!(right.map(|v| v * 2), Either::Right(4));
        assert_eq!(right.fold(|_| 0, |v| v), 2);
        let left: Either<&str, u8> = Err::<u8, &str>("nope").into();
        assert!(left.is_left());
        assert_eq!(left.left(), Some("nope"));
    }

    #[tokio::test]
    async fn eval_runs_once_when_forced() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let mut eval = Eval::later(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            done(Value::from(json!("meow")))
        });

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(!eval.is_forced());
        assert_eq!(eval.force().await.unwrap().as_data(), Some(&json!("meow")));
        assert_eq!(eval.force().await.unwrap().as_data(), Some(&json!("meow")));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn eval_memoizes_the_same_failure() {
        let mut eval = Eval::later(|| {
            failed(CallError::transport(io::Error::new(io::ErrorKind::Other, "down")))
        });
        let first = eval.force().await.unwrap_err();
        let second = eval.force().await.unwrap_err();
        match (first, second) {
            (CallError::Transport(a), CallError::Transport(b)) => assert!(Arc::ptr_eq(&a, &b)),
            other => panic!("unexpected errors: {other:?}"),
        }
    }

    #[tokio::test]
    async fn eval_dropped_mid_force_reports_interruption() {
        let mut eval = Eval::later(|| futures::future::pending().boxed());
        assert!(eval.force().now_or_never().is_none());
        assert!(matches!(eval.force().await, Err(CallError::Interrupted(_))));
    }

    #[tokio::test]
    async fn eval_nests_inside_other_containers() {
        let nested = Value::some(Value::Eval(Box::new(Eval::now(Value::from(json!("Tom"))))));
        let mut eval = nested.into_option().unwrap().expect("some").into_eval().unwrap();
        assert_eq!(eval.force().await.unwrap().as_data(), Some(&json!("Tom")));
    }

    #[tokio::test]
    async fn effect_folds_only_its_left_class() {
        let io_failure = || CallError::transport(io::Error::new(io::ErrorKind::Other, "x"));
        let folded = Effect::new(&IO_ERROR, failed(io_failure())).into_either().await.unwrap();
        assert!(folded.is_left());

        let escaped = Effect::new(&IO_ERROR, failed(CallError::EmptyCollection)).into_either().await;
        assert!(matches!(escaped, Err(CallError::EmptyCollection)));

        let right =
            Effect::new(&EXCEPTION, done(Value::Unit)).fold(|_| "left", |_| "right").await;
        assert_eq!(right.unwrap(), "right");
    }

    #[tokio::test]
    async fn flow_streams_elements_in_order() {
        let elements: ElementStream =
            Box::new(vec![Value::from(json!(1)), Value::from(json!(2))].into_iter());
        let collected: Vec<_> = Flow::new(elements).collect().await;
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[1].as_data(), Some(&json!(2)));
    }

    #[tokio::test]
    async fn deferred_propagates_failure_unchanged() {
        let deferred = Deferred::spawn(failed(CallError::EmptyCollection));
        assert!(matches!(deferred.await, Err(CallError::EmptyCollection)));

        let aborted = Deferred::spawn(futures::future::pending().boxed());
        aborted.abort();
        assert!(matches!(aborted.join().await, Err(CallError::Interrupted(_))));
    }

    #[test]
    fn spawning_without_runtime_fails_the_task() {
        let deferred = Deferred::spawn(done(Value::Unit));
        assert!(deferred.is_finished());
        let err = futures::executor::block_on(deferred).unwrap_err();
        assert!(err.is_instance_of(&crate::error::INTERRUPTED));

        let job = Job::spawn(done(Value::Unit));
        assert!(matches!(futures::executor::block_on(job.join()), Err(CallError::Interrupted(_))));
    }

    #[tokio::test]
    async fn job_discards_the_value() {
        let job = Job::spawn(done(Value::from(json!("ignored"))));
        job.await.unwrap();
    }
}
