use crate::adapter::{ResponseAdapter, ResponseFn};
use crate::endpoint::{Arguments, Endpoint};
use crate::pending::{self, Pending};
use crate::response::BoxResponse;
use crate::types::{Type, EVAL};
use crate::value::{Eval, Value};
use std::sync::Arc;

/// `Eval<T>`: the call runs once, when the returned [`Eval`] is first forced.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalAdapter;

impl ResponseAdapter for EvalAdapter {
    fn test(&self, endpoint: &Endpoint) -> bool {
        endpoint.return_type().is(&EVAL)
    }

    fn adapted(&self, endpoint: &Endpoint) -> Type {
        endpoint.return_type().first_arg()
    }

    fn bind(&self, endpoint: &Endpoint, next: Arc<dyn ResponseFn>) -> Arc<dyn ResponseFn> {
        Arc::new(EvalStage { declared: endpoint.return_type().clone(), next })
    }
}

struct EvalStage {
    declared: Type,
    next: Arc<dyn ResponseFn>,
}

impl ResponseFn for EvalStage {
    fn run(&self, response: Pending<BoxResponse>, arguments: Arguments) -> Pending<Value> {
        let next = self.next.clone();
        let eval = Eval::later(move || next.run(response, arguments));
        pending::done(Value::Eval(Box::new(eval)))
    }

    fn return_type(&self) -> Type {
        self.declared.clone()
    }
}
