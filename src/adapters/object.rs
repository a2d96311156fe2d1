use crate::adapter::ResponseFn;
use crate::endpoint::Arguments;
use crate::pending::{self, Pending, PendingExt};
use crate::response::BoxResponse;
use crate::types::Type;
use crate::value::Value;

/// Terminal stage: the decoded body of the response, or its failure.
///
/// Endpoints declaring no value complete with [`Value::Unit`] once a successful response
/// arrives.
#[derive(Debug, Clone)]
pub struct ObjectStage {
    declared: Type,
}

impl ObjectStage {
    pub fn new(declared: Type) -> Self {
        Self { declared }
    }
}

impl ResponseFn for ObjectStage {
    fn run(&self, response: Pending<BoxResponse>, _arguments: Arguments) -> Pending<Value> {
        let discard = self.declared == Type::None;
        response.bind(move |response| {
            let body = response.into_body();
            pending::from_result(if discard { body.map(|_| Value::Unit) } else { body })
        })
    }

    fn return_type(&self) -> Type {
        self.declared.clone()
    }
}
