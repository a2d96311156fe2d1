//! Error types surfaced by adapters, recovery and the circuit breaker guard.
//!
//! Every [`CallError`] has a runtime [`Class`] so adapters such as `Either<E, S>` can decide
//! whether a failure fits the declared error parameter or must propagate unchanged.

use crate::circuit_breaker::CircuitState;
use crate::types::{Class, Type, EXCEPTION, THROWABLE};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub static HTTP_RESPONSE_ERROR: Class = Class::extends("HttpResponseError", &EXCEPTION);
pub static CLIENT_ERROR: Class = Class::extends("ClientError", &HTTP_RESPONSE_ERROR);
pub static SERVER_ERROR: Class = Class::extends("ServerError", &HTTP_RESPONSE_ERROR);
pub static BAD_REQUEST: Class = Class::extends("BadRequest", &CLIENT_ERROR);
pub static UNAUTHORIZED: Class = Class::extends("Unauthorized", &CLIENT_ERROR);
pub static FORBIDDEN: Class = Class::extends("Forbidden", &CLIENT_ERROR);
pub static NOT_FOUND: Class = Class::extends("NotFound", &CLIENT_ERROR);
pub static CONFLICT: Class = Class::extends("Conflict", &CLIENT_ERROR);
pub static TOO_MANY_REQUESTS: Class = Class::extends("TooManyRequests", &CLIENT_ERROR);
pub static INTERNAL_SERVER_ERROR: Class = Class::extends("InternalServerError", &SERVER_ERROR);
pub static BAD_GATEWAY: Class = Class::extends("BadGateway", &SERVER_ERROR);
pub static SERVICE_UNAVAILABLE: Class = Class::extends("ServiceUnavailable", &SERVER_ERROR);
pub static GATEWAY_TIMEOUT: Class = Class::extends("GatewayTimeout", &SERVER_ERROR);

pub static EXECUTION_REJECTED: Class = Class::extends("ExecutionRejected", &EXCEPTION);
pub static UNRECOVERABLE_RESPONSE: Class = Class::extends("UnrecoverableResponse", &EXCEPTION);
pub static NO_SUCH_ELEMENT: Class = Class::extends("NoSuchElement", &EXCEPTION);
pub static DECODE_ERROR: Class = Class::extends("DecodeError", &EXCEPTION);
pub static ILLEGAL_STATE: Class = Class::extends("IllegalState", &EXCEPTION);
pub static IO_ERROR: Class = Class::extends("IoError", &EXCEPTION);
pub static INTERRUPTED: Class = Class::extends("Interrupted", &THROWABLE);

/// Failure of any stage in a call: adapter, recovery, guard or transport.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// The server answered with a failure status.
    #[error(transparent)]
    Response(#[from] ResponseError),
    /// The circuit breaker refused to run the request.
    #[error(transparent)]
    Rejected(#[from] ExecutionRejected),
    /// A failure response could not be decoded into the declared error type.
    #[error("unrecoverable response ({response}): {cause}")]
    Unrecoverable {
        response: ResponseError,
        #[source]
        cause: Arc<CallError>,
    },
    /// A non-empty container was requested from an empty collection.
    #[error("expected at least one element, but the collection was empty")]
    EmptyCollection,
    /// A body reader failed or none was available.
    #[error("cannot read {media_type} as {target}: {message}")]
    Decode { media_type: String, target: Type, message: String },
    /// A stage produced a value of the wrong shape for the next one.
    #[error("expected {expected}, found {found}")]
    UnexpectedValue { expected: &'static str, found: &'static str },
    /// Connection or I/O failure from the HTTP engine.
    #[error("transport failure: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),
    /// An application error tagged with an explicit class.
    #[error("{error}")]
    Raised { class: &'static Class, error: Arc<dyn std::error::Error + Send + Sync> },
    /// A spawned task was cancelled or panicked.
    #[error("task interrupted: {0}")]
    Interrupted(String),
}

impl CallError {
    /// Wrap an application error under `class`.
    pub fn raised<E>(class: &'static Class, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CallError::Raised { class, error: Arc::new(error) }
    }

    pub fn transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CallError::Transport(Arc::new(error))
    }

    pub fn decode(
        media_type: impl Into<String>,
        target: &Type,
        message: impl fmt::Display,
    ) -> Self {
        CallError::Decode {
            media_type: media_type.into(),
            target: target.clone(),
            message: message.to_string(),
        }
    }

    /// Runtime class of this failure.
    pub fn class(&self) -> &'static Class {
        match self {
            CallError::Response(error) => error.class(),
            CallError::Rejected(_) => &EXECUTION_REJECTED,
            CallError::Unrecoverable { .. } => &UNRECOVERABLE_RESPONSE,
            CallError::EmptyCollection => &NO_SUCH_ELEMENT,
            CallError::Decode { .. } => &DECODE_ERROR,
            CallError::UnexpectedValue { .. } => &ILLEGAL_STATE,
            CallError::Transport(_) => &IO_ERROR,
            CallError::Raised { class, .. } => class,
            CallError::Interrupted(_) => &INTERRUPTED,
        }
    }

    /// True when this failure's class is `class` or a subclass of it.
    pub fn is_instance_of(&self, class: &Class) -> bool {
        self.class().is_subclass_of(class)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, CallError::Rejected(_))
    }

    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, CallError::Unrecoverable { .. })
    }

    /// The HTTP failure behind this error, looking through unrecoverable wrappers.
    pub fn response(&self) -> Option<&ResponseError> {
        match self {
            CallError::Response(error) => Some(error),
            CallError::Unrecoverable { response, .. } => Some(response),
            _ => None,
        }
    }

    /// The breaker rejection, if this is one.
    pub fn rejection(&self) -> Option<&ExecutionRejected> {
        match self {
            CallError::Rejected(rejected) => Some(rejected),
            _ => None,
        }
    }
}

impl From<tokio::task::JoinError> for CallError {
    fn from(error: tokio::task::JoinError) -> Self {
        CallError::Interrupted(error.to_string())
    }
}

/// A response with a failure status, kept with its headers and raw body so it can be recovered.
///
/// Clones share the same headers and body.
#[derive(Debug, Clone, Error)]
#[error("HTTP {}", .parts.status)]
pub struct ResponseError {
    parts: Arc<ResponseParts>,
}

#[derive(Debug)]
struct ResponseParts {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ResponseError {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self { parts: Arc::new(ResponseParts { status, headers, body: body.into() }) }
    }

    pub fn status(&self) -> StatusCode {
        self.parts.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.parts.body
    }

    /// Class derived from the status code.
    pub fn class(&self) -> &'static Class {
        match self.parts.status {
            StatusCode::BAD_REQUEST => &BAD_REQUEST,
            StatusCode::UNAUTHORIZED => &UNAUTHORIZED,
            StatusCode::FORBIDDEN => &FORBIDDEN,
            StatusCode::NOT_FOUND => &NOT_FOUND,
            StatusCode::CONFLICT => &CONFLICT,
            StatusCode::TOO_MANY_REQUESTS => &TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR => &INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY => &BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE => &SERVICE_UNAVAILABLE,
            StatusCode::GATEWAY_TIMEOUT => &GATEWAY_TIMEOUT,
            s if s.is_client_error() => &CLIENT_ERROR,
            s if s.is_server_error() => &SERVER_ERROR,
            _ => &HTTP_RESPONSE_ERROR,
        }
    }
}

/// Raised when the circuit breaker short-circuits a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("execution rejected while circuit is {state:?}: {reason}")]
pub struct ExecutionRejected {
    reason: String,
    state: CircuitState,
    failure_count: usize,
    open_for: Duration,
}

impl ExecutionRejected {
    pub fn new(
        reason: impl Into<String>,
        state: CircuitState,
        failure_count: usize,
        open_for: Duration,
    ) -> Self {
        Self { reason: reason.into(), state, failure_count, open_for }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Breaker state observed when the call was rejected.
    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failure_count(&self) -> usize {
        self.failure_count
    }

    /// How long the breaker had been open; zero for predicate rejections.
    pub fn open_for(&self) -> Duration {
        self.open_for
    }
}
