#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Whiskers 🐱
//!
//! Response-container adapters and circuit-breaker guarding for declarative async HTTP clients.
//!
//! ## Features
//!
//! - **Container adapters** turning one call's response into `Either`, `Option`, `Eval`,
//!   `NonEmptyList`, `Effect`, sequences, flows and spawned tasks
//! - **Failure recovery** decoding error bodies into a declared error type
//! - **Circuit breaker guard** as a request interceptor or a tower layer
//! - **Lock-free breaker** using atomics, with listeners and reset-timeout backoff
//!
//! ## Quick Start
//!
//! ```rust
//! use whiskers::adapter::ResponseAdapters;
//! use whiskers::endpoint::{Arguments, Endpoint};
//! use whiskers::response::{BoxResponse, HttpResponse};
//! use whiskers::types::{Type, EXCEPTION, EITHER, STRING};
//! use whiskers::{pending, Value};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let adapters = ResponseAdapters::with_defaults();
//!     let endpoint = Endpoint::new(
//!         "getCat",
//!         Type::parameterized(&EITHER, vec![Type::of(&EXCEPTION), Type::of(&STRING)]),
//!     );
//!     let response: BoxResponse = Box::new(HttpResponse::ok(Value::from(json!("Tom"))));
//!
//!     let either = adapters
//!         .call(&endpoint, pending::done(response), Arguments::empty())
//!         .await
//!         .unwrap()
//!         .into_either()
//!         .unwrap();
//!     assert_eq!(either.right().and_then(|v| v.as_data().cloned()), Some(json!("Tom")));
//! }
//! ```

pub mod adapter;
pub mod adapters;
pub mod bridge;
pub mod circuit_breaker;
pub mod clock;
pub mod endpoint;
pub mod error;
pub mod guard;
pub mod pending;
pub mod prelude;
pub mod readers;
pub mod request;
pub mod response;
pub mod types;
pub mod value;

// Re-exports
pub use adapter::{ResponseAdapter, ResponseAdapters, ResponseFn};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitEvent, CircuitState, Permit,
};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use endpoint::{Arguments, Endpoint};
pub use error::{CallError, ExecutionRejected, ResponseError};
pub use guard::{CircuitBreakerInterceptor, CircuitBreakerLayer, CircuitBreakerRequest};
pub use pending::{Pending, PendingExt};
pub use value::{Either, NonEmptyList, Value};
