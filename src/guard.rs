//! Circuit breaker guarding for outgoing requests.
//!
//! [`CircuitBreakerInterceptor`] wraps every request in a [`CircuitBreakerRequest`]; executing it
//! asks the breaker first, classifies the response with a [`ResponsePredicate`] and reports the
//! outcome. [`CircuitBreakerLayer`] applies the same guard to any tower service producing
//! responses.
//!
//! Classification:
//! - rejected by the breaker: fails with [`CallError::Rejected`]; the request is never sent.
//! - accepted by the predicate: success recorded, response returned.
//! - refused by the predicate: failure recorded; fails with the response's own
//!   [`ResponseError`](crate::error::ResponseError) or, for a non-failure response, with a
//!   synthesized rejection.
//! - execution error: failure recorded, error returned unchanged.

use crate::circuit_breaker::CircuitBreaker;
use crate::error::{CallError, ExecutionRejected};
use crate::pending::{self, Pending, PendingExt};
use crate::request::{BoxRequest, HttpRequest, RequestInterceptor};
use crate::response::{BoxResponse, Response};
use bytes::Bytes;
use futures::future::BoxFuture;
use http::{HeaderMap, Method};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tower_layer::Layer;
use tower_service::Service;

/// Decides whether a response counts as a success for the breaker.
pub type ResponsePredicate = Arc<dyn Fn(&dyn Response) -> bool + Send + Sync>;

/// Default predicate: any 2xx status.
pub fn successful_status() -> ResponsePredicate {
    Arc::new(|response: &dyn Response| response.status().is_success())
}

async fn guard<Op, Fut>(
    breaker: &CircuitBreaker,
    predicate: &ResponsePredicate,
    operation: Op,
) -> Result<BoxResponse, CallError>
where
    Op: FnOnce() -> Fut,
    Fut: Future<Output = Result<BoxResponse, CallError>>,
{
    breaker
        .protect(|| async move {
            let response = operation().await?;
            if predicate(response.as_ref()) {
                return Ok(response);
            }
            tracing::debug!(
                status = %response.status(),
                "Circuit breaker: response counted as failure"
            );
            Err(refused(breaker, response.as_ref()))
        })
        .await
}

fn refused(breaker: &CircuitBreaker, response: &dyn Response) -> CallError {
    match response.failure() {
        Some(failure) => CallError::Response(failure.clone()),
        None => CallError::Rejected(ExecutionRejected::new(
            format!("rejected: {}", response.status()),
            breaker.state(),
            breaker.failure_count(),
            Duration::ZERO,
        )),
    }
}

/// A request whose execution is guarded by a circuit breaker.
#[derive(Clone)]
pub struct CircuitBreakerRequest {
    inner: Arc<dyn HttpRequest>,
    breaker: CircuitBreaker,
    predicate: ResponsePredicate,
    context: Option<Handle>,
}

impl CircuitBreakerRequest {
    pub fn new(
        inner: BoxRequest,
        breaker: CircuitBreaker,
        predicate: ResponsePredicate,
        context: Option<Handle>,
    ) -> Self {
        Self { inner: Arc::from(inner), breaker, predicate, context }
    }

    /// The wrapped request.
    pub fn inner(&self) -> &dyn HttpRequest {
        self.inner.as_ref()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn rewrap(&self, inner: BoxRequest) -> BoxRequest {
        Box::new(Self { inner: Arc::from(inner), ..self.clone() })
    }
}

impl fmt::Debug for CircuitBreakerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerRequest")
            .field("inner", &self.inner)
            .field("breaker", &self.breaker)
            .field("context", &self.context.is_some())
            .finish()
    }
}

impl HttpRequest for CircuitBreakerRequest {
    fn path(&self) -> &str {
        self.inner.path()
    }

    fn method(&self) -> &Method {
        self.inner.method()
    }

    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn body(&self) -> Option<&Bytes> {
        self.inner.body()
    }

    fn with_path(&self, path: &str) -> BoxRequest {
        self.rewrap(self.inner.with_path(path))
    }

    fn with_method(&self, method: Method) -> BoxRequest {
        self.rewrap(self.inner.with_method(method))
    }

    fn with_headers(&self, headers: HeaderMap) -> BoxRequest {
        self.rewrap(self.inner.with_headers(headers))
    }

    fn with_body(&self, body: Option<Bytes>) -> BoxRequest {
        self.rewrap(self.inner.with_body(body))
    }

    fn execute(&self) -> Pending<BoxResponse> {
        let inner = self.inner.clone();
        let breaker = self.breaker.clone();
        let predicate = self.predicate.clone();
        let guarded = pending::from_future(async move {
            guard(&breaker, &predicate, move || inner.execute()).await
        });

        match &self.context {
            Some(handle) => {
                let task = handle.spawn(guarded);
                pending::from_future(async move {
                    match task.await {
                        Ok(result) => result,
                        Err(error) => Err(error.into()),
                    }
                })
            }
            None => guarded,
        }
    }
}

/// Wraps every intercepted request in a [`CircuitBreakerRequest`] sharing one breaker.
#[derive(Clone)]
pub struct CircuitBreakerInterceptor {
    breaker: CircuitBreaker,
    predicate: ResponsePredicate,
    context: Option<Handle>,
}

impl CircuitBreakerInterceptor {
    /// Guard with `breaker`, counting 2xx responses as successes.
    pub fn new(breaker: CircuitBreaker) -> Self {
        Self { breaker, predicate: successful_status(), context: None }
    }

    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&dyn Response) -> bool + Send + Sync + 'static,
    {
        self.predicate = Arc::new(predicate);
        self
    }

    /// Run guarded executions as tasks on `handle`.
    pub fn with_context(mut self, handle: Handle) -> Self {
        self.context = Some(handle);
        self
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

impl fmt::Debug for CircuitBreakerInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerInterceptor")
            .field("breaker", &self.breaker)
            .field("context", &self.context.is_some())
            .finish()
    }
}

impl RequestInterceptor for CircuitBreakerInterceptor {
    fn intercepts(&self, request: Pending<BoxRequest>) -> Pending<BoxRequest> {
        let breaker = self.breaker.clone();
        let predicate = self.predicate.clone();
        let context = self.context.clone();
        request.transform(move |inner| {
            Box::new(CircuitBreakerRequest::new(inner, breaker, predicate, context)) as BoxRequest
        })
    }
}

/// Tower layer applying the circuit breaker guard to a response-producing service.
#[derive(Clone)]
pub struct CircuitBreakerLayer {
    breaker: CircuitBreaker,
    predicate: ResponsePredicate,
}

impl CircuitBreakerLayer {
    pub fn new(breaker: CircuitBreaker) -> Self {
        Self { breaker, predicate: successful_status() }
    }

    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&dyn Response) -> bool + Send + Sync + 'static,
    {
        self.predicate = Arc::new(predicate);
        self
    }
}

impl fmt::Debug for CircuitBreakerLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerLayer").field("breaker", &self.breaker).finish()
    }
}

impl<S> Layer<S> for CircuitBreakerLayer {
    type Service = CircuitBreakerService<S>;

    fn layer(&self, service: S) -> Self::Service {
        CircuitBreakerService {
            inner: service,
            breaker: self.breaker.clone(),
            predicate: self.predicate.clone(),
        }
    }
}

/// Service produced by [`CircuitBreakerLayer`].
#[derive(Clone)]
pub struct CircuitBreakerService<S> {
    inner: S,
    breaker: CircuitBreaker,
    predicate: ResponsePredicate,
}

impl<S, Request> Service<Request> for CircuitBreakerService<S>
where
    Request: Send + 'static,
    S: Service<Request, Response = BoxResponse, Error = CallError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = BoxResponse;
    type Error = CallError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let breaker = self.breaker.clone();
        let predicate = self.predicate.clone();
        let mut inner = self.inner.clone();
        Box::pin(async move { guard(&breaker, &predicate, move || inner.call(req)).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::clock::ManualClock;
    use crate::error::ResponseError;
    use crate::response::HttpResponse;
    use crate::value::Value;
    use http::StatusCode;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Replays scripted outcomes and counts executions.
    #[derive(Debug, Clone)]
    struct ScriptedRequest {
        path: String,
        method: Method,
        headers: HeaderMap,
        outcomes: Arc<Mutex<Vec<Result<StatusCode, &'static str>>>>,
        executions: Arc<AtomicUsize>,
    }

    impl ScriptedRequest {
        fn new(outcomes: Vec<Result<StatusCode, &'static str>>) -> Self {
            Self {
                path: "/cats".into(),
                method: Method::GET,
                headers: HeaderMap::new(),
                outcomes: Arc::new(Mutex::new(outcomes.into_iter().rev().collect())),
                executions: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    fn respond(status: StatusCode) -> BoxResponse {
        if status.is_success() || status.is_redirection() {
            Box::new(HttpResponse::new(status, HeaderMap::new(), Value::Unit))
        } else {
            let error = ResponseError::new(status, HeaderMap::new(), Bytes::new());
            Box::new(HttpResponse::failed(error))
        }
    }

    impl HttpRequest for ScriptedRequest {
        fn path(&self) -> &str {
            &self.path
        }

        fn method(&self) -> &Method {
            &self.method
        }

        fn headers(&self) -> &HeaderMap {
            &self.headers
        }

        fn body(&self) -> Option<&Bytes> {
            None
        }

        fn with_path(&self, path: &str) -> BoxRequest {
            Box::new(Self { path: path.to_owned(), ..self.clone() })
        }

        fn with_method(&self, method: Method) -> BoxRequest {
            Box::new(Self { method, ..self.clone() })
        }

        fn with_headers(&self, headers: HeaderMap) -> BoxRequest {
            Box::new(Self { headers, ..self.clone() })
        }

        fn with_body(&self, _body: Option<Bytes>) -> BoxRequest {
            Box::new(self.clone())
        }

        fn execute(&self) -> Pending<BoxResponse> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            let next = self.outcomes.lock().unwrap().pop().unwrap_or(Ok(StatusCode::OK));
            pending::from_result(match next {
                Ok(status) => Ok(respond(status)),
                Err(message) => Err(CallError::transport(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    message,
                ))),
            })
        }
    }

    async fn guarded(
        interceptor: &CircuitBreakerInterceptor,
        request: &ScriptedRequest,
    ) -> BoxRequest {
        let request = Box::new(request.clone()) as BoxRequest;
        interceptor.intercepts(pending::done(request)).await.unwrap()
    }

    #[tokio::test]
    async fn success_passes_through_and_closes() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(1)).unwrap();
        let interceptor = CircuitBreakerInterceptor::new(breaker.clone());
        let request = ScriptedRequest::new(vec![Ok(StatusCode::OK)]);

        let response = guarded(&interceptor, &request).await.execute().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn failure_status_is_raised_as_its_own_error() {
        let breaker = CircuitBreaker::new(5, Duration::from_secs(1)).unwrap();
        let interceptor = CircuitBreakerInterceptor::new(breaker.clone());
        let request = ScriptedRequest::new(vec![Ok(StatusCode::SERVICE_UNAVAILABLE)]);

        let err = guarded(&interceptor, &request).await.execute().await.unwrap_err();
        assert_eq!(
            err.response().map(ResponseError::status),
            Some(StatusCode::SERVICE_UNAVAILABLE)
        );
        assert_eq!(breaker.failure_count(), 1);
    }

    #[tokio::test]
    async fn refused_success_status_synthesizes_rejection() {
        let breaker = CircuitBreaker::new(5, Duration::from_secs(1)).unwrap();
        let interceptor = CircuitBreakerInterceptor::new(breaker.clone())
            .with_predicate(|response| response.status() == StatusCode::OK);
        let request = ScriptedRequest::new(vec![Ok(StatusCode::ACCEPTED)]);

        let err = guarded(&interceptor, &request).await.execute().await.unwrap_err();
        let rejected = err.rejection().expect("synthesized rejection");
        assert_eq!(rejected.reason(), "rejected: 202 Accepted");
        assert_eq!(rejected.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn transport_errors_are_recorded_and_reraised() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(1)).unwrap();
        let interceptor = CircuitBreakerInterceptor::new(breaker.clone());
        let request = ScriptedRequest::new(vec![Err("refused")]);

        let err = guarded(&interceptor, &request).await.execute().await.unwrap_err();
        assert!(matches!(err, CallError::Transport(_)));
        assert_eq!(err.to_string(), "transport failure: refused");
        assert_eq!(breaker.failure_count(), 1);
    }

    #[tokio::test]
    async fn open_breaker_never_executes_the_request() {
        let clock = ManualClock::new();
        let breaker =
            CircuitBreaker::new(1, Duration::from_millis(100)).unwrap().with_clock(clock.clone());
        let interceptor = CircuitBreakerInterceptor::new(breaker.clone());
        let request =
            ScriptedRequest::new(vec![Ok(StatusCode::INTERNAL_SERVER_ERROR), Ok(StatusCode::OK)]);
        let guarded_request = guarded(&interceptor, &request).await;

        assert!(guarded_request.execute().await.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = guarded_request.execute().await.unwrap_err();
        assert_eq!(err.rejection().map(ExecutionRejected::state), Some(CircuitState::Open));
        assert_eq!(request.executions.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_millis(100));
        assert!(guarded_request.execute().await.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(request.executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reconfigured_requests_stay_guarded() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60)).unwrap();
        let interceptor = CircuitBreakerInterceptor::new(breaker.clone());
        let request = ScriptedRequest::new(vec![Ok(StatusCode::BAD_GATEWAY)]);

        let moved = guarded(&interceptor, &request).await.with_path("/dogs");
        assert_eq!(moved.path(), "/dogs");
        let _ = moved.execute().await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let rejected = moved.with_method(Method::POST).execute().await.unwrap_err();
        assert!(rejected.is_rejected());
        assert_eq!(request.executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn execution_context_runs_on_the_given_runtime() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(1)).unwrap();
        let interceptor =
            CircuitBreakerInterceptor::new(breaker).with_context(Handle::current());
        let request = ScriptedRequest::new(vec![Ok(StatusCode::NO_CONTENT)]);

        let response = guarded(&interceptor, &request).await.execute().await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn tower_service_shares_the_guard() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60)).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let service = tower::service_fn(move |status: StatusCode| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, CallError>(respond(status)) }
        });
        let mut service = CircuitBreakerLayer::new(breaker.clone()).layer(service);

        let err = service.ready().await.unwrap().call(StatusCode::BAD_GATEWAY).await.unwrap_err();
        assert!(matches!(err, CallError::Response(_)));
        let err = service.ready().await.unwrap().call(StatusCode::OK).await.unwrap_err();
        assert!(err.is_rejected());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
