use crate::adapter::{ResponseAdapter, ResponseFn};
use crate::endpoint::{Arguments, Endpoint};
use crate::pending::{self, Pending, PendingExt};
use crate::response::BoxResponse;
use crate::types::{Type, FLOW, SEQUENCE, STREAM};
use crate::value::{ElementStream, Flow, Sequence, Value};
use std::sync::Arc;

fn stream_of(endpoint: &Endpoint) -> Type {
    Type::parameterized(&STREAM, vec![endpoint.return_type().first_arg()])
}

/// `Sequence<T>`: a lazy, single-pass iterator over a `Stream<T>` body.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceAdapter;

impl ResponseAdapter for SequenceAdapter {
    fn test(&self, endpoint: &Endpoint) -> bool {
        endpoint.return_type().is(&SEQUENCE)
    }

    fn adapted(&self, endpoint: &Endpoint) -> Type {
        stream_of(endpoint)
    }

    fn bind(&self, endpoint: &Endpoint, next: Arc<dyn ResponseFn>) -> Arc<dyn ResponseFn> {
        Arc::new(ElementsStage { declared: endpoint.return_type().clone(), next, wrap: sequence })
    }
}

/// `Flow<T>`: an asynchronous stream over a `Stream<T>` body.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowAdapter;

impl ResponseAdapter for FlowAdapter {
    fn test(&self, endpoint: &Endpoint) -> bool {
        endpoint.return_type().is(&FLOW)
    }

    fn adapted(&self, endpoint: &Endpoint) -> Type {
        stream_of(endpoint)
    }

    fn bind(&self, endpoint: &Endpoint, next: Arc<dyn ResponseFn>) -> Arc<dyn ResponseFn> {
        Arc::new(ElementsStage { declared: endpoint.return_type().clone(), next, wrap: flow })
    }
}

fn sequence(elements: ElementStream) -> Value {
    Value::Sequence(Sequence::new(elements))
}

fn flow(elements: ElementStream) -> Value {
    Value::Flow(Flow::new(elements))
}

struct ElementsStage {
    declared: Type,
    next: Arc<dyn ResponseFn>,
    wrap: fn(ElementStream) -> Value,
}

impl ResponseFn for ElementsStage {
    fn run(&self, response: Pending<BoxResponse>, arguments: Arguments) -> Pending<Value> {
        let wrap = self.wrap;
        self.next
            .run(response, arguments)
            .bind(move |value| pending::from_result(value.into_stream().map(wrap)))
    }

    fn return_type(&self) -> Type {
        self.declared.clone()
    }
}
