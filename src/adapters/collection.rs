use crate::adapter::{ResponseAdapter, ResponseFn};
use crate::endpoint::{Arguments, Endpoint};
use crate::pending::{self, Pending, PendingExt};
use crate::response::BoxResponse;
use crate::types::{Type, COLLECTION, LIST, STREAM};
use crate::value::Value;
use std::sync::Arc;

/// Normalizes `Collection<T>`, `List<T>` and `Set<T>` bodies into a [`Value::List`].
///
/// An absent body is an empty collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionAdapter;

impl ResponseAdapter for CollectionAdapter {
    fn test(&self, endpoint: &Endpoint) -> bool {
        endpoint.return_type().compatible(&COLLECTION)
    }

    fn adapted(&self, endpoint: &Endpoint) -> Type {
        Type::parameterized(&LIST, vec![endpoint.return_type().first_arg()])
    }

    fn bind(&self, endpoint: &Endpoint, next: Arc<dyn ResponseFn>) -> Arc<dyn ResponseFn> {
        Arc::new(CollectionStage { declared: endpoint.return_type().clone(), next })
    }
}

struct CollectionStage {
    declared: Type,
    next: Arc<dyn ResponseFn>,
}

impl ResponseFn for CollectionStage {
    fn run(&self, response: Pending<BoxResponse>, arguments: Arguments) -> Pending<Value> {
        self.next
            .run(response, arguments)
            .bind(|value| pending::from_result(value.into_list().map(Value::List)))
    }

    fn return_type(&self) -> Type {
        self.declared.clone()
    }
}

/// `Stream<T>` over the elements of a `Collection<T>` body.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamAdapter;

impl ResponseAdapter for StreamAdapter {
    fn test(&self, endpoint: &Endpoint) -> bool {
        endpoint.return_type().is(&STREAM)
    }

    fn adapted(&self, endpoint: &Endpoint) -> Type {
        Type::parameterized(&COLLECTION, vec![endpoint.return_type().first_arg()])
    }

    fn bind(&self, endpoint: &Endpoint, next: Arc<dyn ResponseFn>) -> Arc<dyn ResponseFn> {
        Arc::new(StreamStage { declared: endpoint.return_type().clone(), next })
    }
}

struct StreamStage {
    declared: Type,
    next: Arc<dyn ResponseFn>,
}

impl ResponseFn for StreamStage {
    fn run(&self, response: Pending<BoxResponse>, arguments: Arguments) -> Pending<Value> {
        self.next
            .run(response, arguments)
            .bind(|value| pending::from_result(value.into_stream().map(Value::Stream)))
    }

    fn return_type(&self) -> Type {
        self.declared.clone()
    }
}
