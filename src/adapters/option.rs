use crate::adapter::{ResponseAdapter, ResponseFn};
use crate::endpoint::{Arguments, Endpoint};
use crate::pending::{Pending, PendingExt};
use crate::response::BoxResponse;
use crate::types::{Type, OPTION};
use crate::value::Value;
use std::sync::Arc;

/// `Option<T>`: absent bodies and JSON `null` become `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionAdapter;

impl ResponseAdapter for OptionAdapter {
    fn test(&self, endpoint: &Endpoint) -> bool {
        endpoint.return_type().is(&OPTION)
    }

    fn adapted(&self, endpoint: &Endpoint) -> Type {
        endpoint.return_type().first_arg()
    }

    fn bind(&self, endpoint: &Endpoint, next: Arc<dyn ResponseFn>) -> Arc<dyn ResponseFn> {
        Arc::new(OptionStage { declared: endpoint.return_type().clone(), next })
    }
}

struct OptionStage {
    declared: Type,
    next: Arc<dyn ResponseFn>,
}

impl ResponseFn for OptionStage {
    fn run(&self, response: Pending<BoxResponse>, arguments: Arguments) -> Pending<Value> {
        self.next.run(response, arguments).transform(|value| {
            if value.is_absent() {
                Value::none()
            } else {
                Value::some(value)
            }
        })
    }

    fn return_type(&self) -> Type {
        self.declared.clone()
    }
}

#[cfg(test)]
mod tests {
    use crate::adapters::testing::{call, generic, ok, status};
    use crate::types::{Type, OPTION, STRING};
    use http::StatusCode;
    use serde_json::json;

    fn declared() -> Type {
        generic(&OPTION, vec![Type::of(&STRING)])
    }

    #[tokio::test]
    async fn present_value_is_some() {
        let option = call(declared(), ok(json!("ginger"))).await.unwrap().into_option().unwrap();
        assert_eq!(option.unwrap().as_data(), Some(&json!("ginger")));
    }

    #[tokio::test]
    async fn null_is_none() {
        let option = call(declared(), ok(json!(null))).await.unwrap().into_option().unwrap();
        assert!(option.is_none());
    }

    #[tokio::test]
    async fn failures_still_propagate() {
        assert!(call(declared(), status(StatusCode::NOT_FOUND)).await.is_err());
    }
}
