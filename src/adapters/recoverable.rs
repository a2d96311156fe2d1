use crate::adapter::{ResponseAdapter, ResponseFn};
use crate::endpoint::{Arguments, Endpoint};
use crate::error::CallError;
use crate::pending::{self, Pending};
use crate::response::BoxResponse;
use crate::types::{Type, EITHER, THROWABLE};
use crate::value::Value;
use std::sync::Arc;

/// `Either<E, S>` where `E` is a caller-defined error body type outside the throwable hierarchy.
///
/// A failure response is decoded into `E` and returned as a successful `Left`. A failure that
/// cannot be decoded, including one without the recovery capability, fails with
/// [`CallError::Unrecoverable`]. Successful responses continue down the pipeline and become
/// `Right`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoverableEitherAdapter;

impl ResponseAdapter for RecoverableEitherAdapter {
    fn test(&self, endpoint: &Endpoint) -> bool {
        let declared = endpoint.return_type();
        declared.is(&EITHER) && !declared.first_arg().compatible(&THROWABLE)
    }

    fn adapted(&self, endpoint: &Endpoint) -> Type {
        endpoint.return_type().arg(1)
    }

    fn bind(&self, endpoint: &Endpoint, next: Arc<dyn ResponseFn>) -> Arc<dyn ResponseFn> {
        let declared = endpoint.return_type().clone();
        let error_type = declared.first_arg();
        Arc::new(RecoverableEitherStage { declared, error_type, next })
    }
}

struct RecoverableEitherStage {
    declared: Type,
    error_type: Type,
    next: Arc<dyn ResponseFn>,
}

impl ResponseFn for RecoverableEitherStage {
    fn run(&self, response: Pending<BoxResponse>, arguments: Arguments) -> Pending<Value> {
        let next = self.next.clone();
        let error_type = self.error_type.clone();
        pending::from_future(async move {
            let response = response.await?;

            let recovering = response.recoverable().map(|r| r.recover(&error_type));
            if let Some(recovering) = recovering {
                return recovering.await.map(Value::left);
            }

            let failure = response.failure().cloned();
            if let Some(failure) = failure {
                let cause = CallError::decode(
                    "(none)",
                    &error_type,
                    "failure response does not support recovery",
                );
                return Err(CallError::Unrecoverable { response: failure, cause: Arc::new(cause) });
            }

            next.run(pending::done(response), arguments).await.map(Value::right)
        })
    }

    fn return_type(&self) -> Type {
        self.declared.clone()
    }
}

#[cfg(test)]
mod tests {
    use crate::adapters::testing::{call, generic, ok, status};
    use crate::error::{CallError, ResponseError};
    use crate::pending::{self, Pending};
    use crate::readers::BodyReaders;
    use crate::response::{BoxResponse, FailurePolicy};
    use crate::types::{Class, Type, EITHER, STRING};
    use bytes::Bytes;
    use http::header::{HeaderValue, CONTENT_TYPE};
    use http::{HeaderMap, StatusCode};
    use serde_json::json;

    static API_ERROR: Class = Class::root("ApiError");

    fn declared() -> Type {
        generic(&EITHER, vec![Type::of(&API_ERROR), Type::of(&STRING)])
    }

    fn recoverable(content_type: &'static str, body: &'static str) -> Pending<BoxResponse> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        let body = Bytes::from_static(body.as_bytes());
        let error = ResponseError::new(StatusCode::BAD_REQUEST, headers, body);
        pending::done(FailurePolicy::Recover(BodyReaders::with_defaults()).respond(error))
    }

    #[tokio::test]
    async fn decoded_failure_is_left() {
        let value = call(declared(), recoverable("application/json", r#"{"code":"E42"}"#))
            .await
            .unwrap();
        let left = value.into_either().unwrap().left().unwrap();
        assert_eq!(left.as_data(), Some(&json!({"code": "E42"})));
    }

    #[tokio::test]
    async fn undecodable_failure_is_unrecoverable() {
        let err = call(declared(), recoverable("text/html", "<h1>bad</h1>")).await.unwrap_err();
        assert!(err.is_unrecoverable());
        assert_eq!(err.response().map(ResponseError::status), Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn failure_without_recovery_capability_is_unrecoverable() {
        let err = call(declared(), status(StatusCode::BAD_REQUEST)).await.unwrap_err();
        assert!(err.is_unrecoverable());
    }

    #[tokio::test]
    async fn success_is_right() {
        let value = call(declared(), ok(json!("calico"))).await.unwrap();
        let right = value.into_either().unwrap().right().unwrap();
        assert_eq!(right.as_data(), Some(&json!("calico")));
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let broken = pending::failed(CallError::Interrupted("connection dropped".into()));
        let err = call(declared(), broken).await.unwrap_err();
        assert!(matches!(err, CallError::Interrupted(_)));
    }
}
