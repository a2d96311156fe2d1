use crate::adapter::{ResponseAdapter, ResponseFn};
use crate::endpoint::{Arguments, Endpoint};
use crate::pending::{Pending, PendingExt};
use crate::response::BoxResponse;
use crate::types::{Class, Type, EITHER, EXCEPTION};
use crate::value::Value;
use std::sync::Arc;

/// `Either<E, S>` where `E` is an exception class.
///
/// Successes become `Right`. Failures whose class is `E` or a subclass become `Left`; any other
/// failure propagates unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct EitherAdapter;

impl ResponseAdapter for EitherAdapter {
    fn test(&self, endpoint: &Endpoint) -> bool {
        let declared = endpoint.return_type();
        declared.is(&EITHER) && declared.first_arg().compatible(&EXCEPTION)
    }

    fn adapted(&self, endpoint: &Endpoint) -> Type {
        endpoint.return_type().arg(1)
    }

    fn bind(&self, endpoint: &Endpoint, next: Arc<dyn ResponseFn>) -> Arc<dyn ResponseFn> {
        let declared = endpoint.return_type().clone();
        let left = declared.first_arg().raw().unwrap_or(&EXCEPTION);
        Arc::new(EitherStage { declared, left, next })
    }
}

struct EitherStage {
    declared: Type,
    left: &'static Class,
    next: Arc<dyn ResponseFn>,
}

impl ResponseFn for EitherStage {
    fn run(&self, response: Pending<BoxResponse>, arguments: Arguments) -> Pending<Value> {
        let left = self.left;
        self.next
            .run(response, arguments)
            .transform(Value::right)
            .recover(
                move |error| error.is_instance_of(left),
                |error| Value::left(Value::Error(error)),
            )
    }

    fn return_type(&self) -> Type {
        self.declared.clone()
    }
}
