//! HTTP responses as seen by the adapter pipeline, and failure recovery.

use crate::error::{CallError, ResponseError};
use crate::pending::{self, Pending};
use crate::readers::{self, BodyReaders};
use crate::types::Type;
use crate::value::Value;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use std::fmt;
use std::sync::Arc;

pub type BoxResponse = Box<dyn Response>;

/// A response produced by the HTTP layer.
pub trait Response: Send + fmt::Debug {
    fn status(&self) -> StatusCode;

    fn headers(&self) -> &HeaderMap;

    /// The failure this response represents, if any.
    fn failure(&self) -> Option<&ResponseError>;

    /// Recovery capability for failure responses whose body can be decoded.
    fn recoverable(&self) -> Option<&dyn RecoverableResponse> {
        None
    }

    /// Consume the response, yielding its decoded body or its failure.
    fn into_body(self: Box<Self>) -> Result<Value, CallError>;
}

/// A failure response that can decode its own body into a caller-chosen error type.
pub trait RecoverableResponse: Send + Sync {
    /// Decode the failure body as `expected`.
    ///
    /// Any problem (missing `Content-Type`, no matching reader, malformed body) fails with
    /// [`CallError::Unrecoverable`] carrying the original response and the cause.
    fn recover(&self, expected: &Type) -> Pending<Value>;
}

/// A plain response: a decoded body or a failure.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    outcome: Outcome,
}

#[derive(Debug)]
enum Outcome {
    Body(Value),
    Failure(ResponseError),
}

impl HttpResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Value) -> Self {
        Self { status, headers, outcome: Outcome::Body(body) }
    }

    /// `200 OK` with `body`.
    pub fn ok(body: Value) -> Self {
        Self::new(StatusCode::OK, HeaderMap::new(), body)
    }

    pub fn failed(error: ResponseError) -> Self {
        Self {
            status: error.status(),
            headers: error.headers().clone(),
            outcome: Outcome::Failure(error),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

impl Response for HttpResponse {
    fn status(&self) -> StatusCode {
        self.status
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn failure(&self) -> Option<&ResponseError> {
        match &self.outcome {
            Outcome::Failure(error) => Some(error),
            Outcome::Body(_) => None,
        }
    }

    fn into_body(self: Box<Self>) -> Result<Value, CallError> {
        match self.outcome {
            Outcome::Body(body) => Ok(body),
            Outcome::Failure(error) => Err(error.into()),
        }
    }
}

/// A failure response that keeps the readers needed to decode its body.
#[derive(Debug, Clone)]
pub struct RecoverableHttpResponse {
    error: ResponseError,
    readers: BodyReaders,
}

impl RecoverableHttpResponse {
    pub fn new(error: ResponseError, readers: BodyReaders) -> Self {
        Self { error, readers }
    }

    fn decode(&self, expected: &Type) -> Result<Value, CallError> {
        let content_type = self
            .error
            .headers()
            .get(CONTENT_TYPE)
            .ok_or_else(|| CallError::decode("(none)", expected, "response has no Content-Type"))?
            .to_str()
            .map_err(|e| CallError::decode("(invalid)", expected, e))?;
        let media_type = readers::media_type(content_type);
        let reader = self.readers.select(&media_type, expected).ok_or_else(|| {
            CallError::decode(&media_type, expected, "no body reader supports this media type")
        })?;
        reader.read(self.error.body(), &media_type, expected)
    }
}

impl Response for RecoverableHttpResponse {
    fn status(&self) -> StatusCode {
        self.error.status()
    }

    fn headers(&self) -> &HeaderMap {
        self.error.headers()
    }

    fn failure(&self) -> Option<&ResponseError> {
        Some(&self.error)
    }

    fn recoverable(&self) -> Option<&dyn RecoverableResponse> {
        Some(self)
    }

    fn into_body(self: Box<Self>) -> Result<Value, CallError> {
        Err(self.error.into())
    }
}

impl RecoverableResponse for RecoverableHttpResponse {
    fn recover(&self, expected: &Type) -> Pending<Value> {
        tracing::debug!(status = %self.error.status(), %expected, "recovering failure response");
        let decoded = self.decode(expected).map_err(|cause| {
            tracing::debug!(
                status = %self.error.status(),
                %cause,
                "failure response is unrecoverable"
            );
            CallError::Unrecoverable { response: self.error.clone(), cause: Arc::new(cause) }
        });
        pending::from_result(decoded)
    }
}

/// How the HTTP layer turns an error status into a response.
#[derive(Debug, Clone, Default)]
pub enum FailurePolicy {
    /// Plain failure; recovery is not possible.
    #[default]
    Raise,
    /// Keep the readers so adapters can decode the failure body.
    Recover(BodyReaders),
}

impl FailurePolicy {
    pub fn respond(&self, error: ResponseError) -> BoxResponse {
        match self {
            FailurePolicy::Raise => Box::new(HttpResponse::failed(error)),
            FailurePolicy::Recover(readers) => {
                Box::new(RecoverableHttpResponse::new(error, readers.clone()))
            }
        }
    }
}
