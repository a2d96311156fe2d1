//! Convenient re-exports for common Whiskers types.
pub use crate::{
    adapter::{ResponseAdapter, ResponseAdapters, ResponseAdaptersBuilder, ResponseFn},
    circuit_breaker::{CircuitBreakerConfig, CircuitBreakerError, CircuitEvent, CircuitState},
    endpoint::{Arguments, Endpoint, Parameter, ParameterKind},
    error::{CallError, ExecutionRejected, ResponseError},
    guard::{CircuitBreakerInterceptor, CircuitBreakerLayer, ResponsePredicate},
    pending::{Pending, PendingExt},
    readers::{BodyReader, BodyReaders},
    request::{BoxRequest, HttpRequest, InterceptorChain, RequestInterceptor},
    response::{BoxResponse, FailurePolicy, HttpResponse, RecoverableResponse, Response},
    types::{Class, Type},
    value::{Deferred, Effect, Either, Eval, Flow, Job, NonEmptyList, Sequence, Value},
    CircuitBreaker,
};
