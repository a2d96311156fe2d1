use crate::adapter::{ResponseAdapter, ResponseFn};
use crate::endpoint::{Arguments, Endpoint};
use crate::pending::{self, Pending};
use crate::response::BoxResponse;
use crate::types::{Type, DEFERRED, JOB};
use crate::value::{Deferred, Job, Value};
use std::sync::Arc;

/// `Deferred<T>`: the call starts as a task on the current tokio runtime once the returned
/// pending value is polled. Without a runtime the deferred value fails as interrupted.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferredAdapter;

impl ResponseAdapter for DeferredAdapter {
    fn test(&self, endpoint: &Endpoint) -> bool {
        endpoint.return_type().is(&DEFERRED)
    }

    fn adapted(&self, endpoint: &Endpoint) -> Type {
        endpoint.return_type().first_arg()
    }

    fn bind(&self, endpoint: &Endpoint, next: Arc<dyn ResponseFn>) -> Arc<dyn ResponseFn> {
        Arc::new(DeferredStage { declared: endpoint.return_type().clone(), next })
    }
}

struct DeferredStage {
    declared: Type,
    next: Arc<dyn ResponseFn>,
}

impl ResponseFn for DeferredStage {
    fn run(&self, response: Pending<BoxResponse>, arguments: Arguments) -> Pending<Value> {
        let inner = self.next.run(response, arguments);
        pending::from_future(async move { Ok(Value::Deferred(Deferred::spawn(inner))) })
    }

    fn return_type(&self) -> Type {
        self.declared.clone()
    }
}

/// `Job`: the call starts as a task and its value is discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobAdapter;

impl ResponseAdapter for JobAdapter {
    fn test(&self, endpoint: &Endpoint) -> bool {
        endpoint.return_type().is(&JOB)
    }

    fn adapted(&self, _endpoint: &Endpoint) -> Type {
        Type::None
    }

    fn bind(&self, endpoint: &Endpoint, next: Arc<dyn ResponseFn>) -> Arc<dyn ResponseFn> {
        Arc::new(JobStage { declared: endpoint.return_type().clone(), next })
    }
}

struct JobStage {
    declared: Type,
    next: Arc<dyn ResponseFn>,
}

impl ResponseFn for JobStage {
    fn run(&self, response: Pending<BoxResponse>, arguments: Arguments) -> Pending<Value> {
        let inner = self.next.run(response, arguments);
        pending::from_future(async move { Ok(Value::Job(Job::spawn(inner))) })
    }

    fn return_type(&self) -> Type {
        self.declared.clone()
    }
}
