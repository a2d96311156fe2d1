use crate::adapter::{ResponseAdapter, ResponseFn};
use crate::endpoint::{Arguments, Endpoint};
use crate::error::CallError;
use crate::pending::{self, Pending, PendingExt};
use crate::response::BoxResponse;
use crate::types::{Type, COLLECTION, NON_EMPTY_LIST};
use crate::value::{NonEmptyList, Value};
use std::sync::Arc;

/// `NonEmptyList<T>` built from a `Collection<T>` body. An empty body fails with
/// [`CallError::EmptyCollection`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NonEmptyListAdapter;

impl ResponseAdapter for NonEmptyListAdapter {
    fn test(&self, endpoint: &Endpoint) -> bool {
        endpoint.return_type().is(&NON_EMPTY_LIST)
    }

    fn adapted(&self, endpoint: &Endpoint) -> Type {
        Type::parameterized(&COLLECTION, vec![endpoint.return_type().first_arg()])
    }

    fn bind(&self, endpoint: &Endpoint, next: Arc<dyn ResponseFn>) -> Arc<dyn ResponseFn> {
        Arc::new(NonEmptyListStage { declared: endpoint.return_type().clone(), next })
    }
}

struct NonEmptyListStage {
    declared: Type,
    next: Arc<dyn ResponseFn>,
}

impl ResponseFn for NonEmptyListStage {
    fn run(&self, response: Pending<BoxResponse>, arguments: Arguments) -> Pending<Value> {
        self.next.run(response, arguments).bind(|value| {
            let items = value.into_list().and_then(|items| {
                NonEmptyList::from_vec(items).ok_or(CallError::EmptyCollection)
            });
            pending::from_result(items.map(Value::NonEmpty))
        })
    }

    fn return_type(&self) -> Type {
        self.declared.clone()
    }
}

#[cfg(test)]
mod tests {
    use crate::adapters::testing::{call, generic, ok};
    use crate::error::{CallError, NO_SUCH_ELEMENT};
    use crate::types::{Type, NON_EMPTY_LIST, STRING};
    use serde_json::json;

    fn declared() -> Type {
        generic(&NON_EMPTY_LIST, vec![Type::of(&STRING)])
    }

    #[tokio::test]
    async fn keeps_order_and_length() {
        let list = call(declared(), ok(json!(["a", "b", "c"])))
            .await
            .unwrap()
            .into_non_empty()
            .unwrap();
        assert_eq!(list.len(), 3);
        let items: Vec<_> = list.iter().filter_map(|v| v.as_data().cloned()).collect();
        assert_eq!(items, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[tokio::test]
    async fn empty_collection_fails() {
        let err = call(declared(), ok(json!([]))).await.unwrap_err();
        assert!(matches!(err, CallError::EmptyCollection));
        assert!(err.is_instance_of(&NO_SUCH_ELEMENT));
    }
}
