use crate::adapter::{ResponseAdapter, ResponseFn};
use crate::endpoint::{Arguments, Endpoint};
use crate::pending::{self, Pending};
use crate::response::BoxResponse;
use crate::types::{Class, Type, EFFECT, EXCEPTION};
use crate::value::{Effect, Value};
use std::sync::Arc;

/// `Effect<E, S>` where `E` is an exception class: a suspended call run when the effect is
/// consumed.
#[derive(Debug, Clone, Copy, Default)]
pub struct EffectAdapter;

impl ResponseAdapter for EffectAdapter {
    fn test(&self, endpoint: &Endpoint) -> bool {
        let declared = endpoint.return_type();
        declared.is(&EFFECT) && declared.first_arg().compatible(&EXCEPTION)
    }

    fn adapted(&self, endpoint: &Endpoint) -> Type {
        endpoint.return_type().arg(1)
    }

    fn bind(&self, endpoint: &Endpoint, next: Arc<dyn ResponseFn>) -> Arc<dyn ResponseFn> {
        let declared = endpoint.return_type().clone();
        let left = declared.first_arg().raw().unwrap_or(&EXCEPTION);
        Arc::new(EffectStage { declared, left, next })
    }
}

struct EffectStage {
    declared: Type,
    left: &'static Class,
    next: Arc<dyn ResponseFn>,
}

impl ResponseFn for EffectStage {
    fn run(&self, response: Pending<BoxResponse>, arguments: Arguments) -> Pending<Value> {
        let suspended = self.next.run(response, arguments);
        pending::done(Value::Effect(Effect::new(self.left, suspended)))
    }

    fn return_type(&self) -> Type {
        self.declared.clone()
    }
}
