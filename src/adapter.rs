//! The response container adapter protocol and the registry that composes adapters.
//!
//! An adapter claims endpoints whose declared return type it understands, names the type the
//! next stage must produce, and wraps that stage. The registry chains adapters until none
//! applies and closes the chain with the terminal [`ObjectStage`].
//!
//! ```
//! use whiskers::adapter::ResponseAdapters;
//! use whiskers::endpoint::{Arguments, Endpoint};
//! use whiskers::pending;
//! use whiskers::response::{BoxResponse, HttpResponse};
//! use whiskers::types::{Type, EXCEPTION, EITHER, OPTION, STRING};
//! use whiskers::value::Value;
//!
//! # tokio_test_block_on(async {
//! let adapters = ResponseAdapters::with_defaults();
//! let declared = Type::parameterized(
//!     &EITHER,
//!     vec![Type::of(&EXCEPTION), Type::parameterized(&OPTION, vec![Type::of(&STRING)])],
//! );
//! let endpoint = Endpoint::new("findCat", declared);
//! let response: BoxResponse = Box::new(HttpResponse::ok(Value::Absent));
//!
//! let value = adapters
//!     .call(&endpoint, pending::done(response), Arguments::empty())
//!     .await
//!     .unwrap();
//! let option = value.into_either().unwrap().right().unwrap().into_option().unwrap();
//! assert!(option.is_none());
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use crate::adapters::{
    CollectionAdapter, DeferredAdapter, EffectAdapter, EitherAdapter, EvalAdapter, FlowAdapter,
    JobAdapter, NonEmptyListAdapter, ObjectStage, OptionAdapter, RecoverableEitherAdapter,
    SequenceAdapter, StreamAdapter,
};
use crate::endpoint::{Arguments, Endpoint};
use crate::pending::Pending;
use crate::response::BoxResponse;
use crate::types::Type;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// One stage of a composed pipeline: transforms a pending response into a pending value.
pub trait ResponseFn: Send + Sync {
    fn run(&self, response: Pending<BoxResponse>, arguments: Arguments) -> Pending<Value>;

    /// Type of the value this stage produces.
    fn return_type(&self) -> Type;
}

/// A type-matching transformer for one container type.
///
/// The registry only calls [`adapted`](Self::adapted) and [`bind`](Self::bind) for endpoints
/// accepted by [`test`](Self::test). `adapted` must be pure.
pub trait ResponseAdapter: Send + Sync + fmt::Debug {
    fn test(&self, endpoint: &Endpoint) -> bool;

    /// The type the next stage must produce for this adapter to do its job.
    fn adapted(&self, endpoint: &Endpoint) -> Type;

    fn bind(&self, endpoint: &Endpoint, next: Arc<dyn ResponseFn>) -> Arc<dyn ResponseFn>;
}

/// Ordered, immutable set of adapters. The first adapter accepting an endpoint wins.
///
/// Each adapter appears at most once in a chain, so an adapter whose adapted type it would
/// accept again hands off to the next candidate instead of looping. Composed pipelines are
/// cached per endpoint.
pub struct ResponseAdapters {
    adapters: Vec<Arc<dyn ResponseAdapter>>,
    cache: RwLock<HashMap<Endpoint, Arc<dyn ResponseFn>>>,
}

impl ResponseAdapters {
    pub fn new(adapters: Vec<Arc<dyn ResponseAdapter>>) -> Self {
        Self { adapters, cache: RwLock::new(HashMap::new()) }
    }

    pub fn builder() -> ResponseAdaptersBuilder {
        ResponseAdaptersBuilder::default()
    }

    /// Every built-in adapter, container adapters first and collection normalization last.
    pub fn with_defaults() -> Self {
        Self::new(default_adapters())
    }

    pub fn adapters(&self) -> &[Arc<dyn ResponseAdapter>] {
        &self.adapters
    }

    /// Compose the pipeline for `endpoint`.
    pub fn select(&self, endpoint: &Endpoint) -> Arc<dyn ResponseFn> {
        if let Some(hit) = self.cache.read().unwrap_or_else(PoisonError::into_inner).get(endpoint)
        {
            return hit.clone();
        }
        let composed = self.compose(endpoint, &mut Vec::new());
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(endpoint.clone())
            .or_insert(composed)
            .clone()
    }

    /// Run one call through the pipeline for `endpoint`.
    pub fn call(
        &self,
        endpoint: &Endpoint,
        response: Pending<BoxResponse>,
        arguments: Arguments,
    ) -> Pending<Value> {
        self.select(endpoint).run(response, arguments)
    }

    fn compose(&self, endpoint: &Endpoint, used: &mut Vec<usize>) -> Arc<dyn ResponseFn> {
        let candidate = self
            .adapters
            .iter()
            .enumerate()
            .find(|(index, adapter)| !used.contains(index) && adapter.test(endpoint));

        match candidate {
            Some((index, adapter)) => {
                used.push(index);
                let adapted = adapter.adapted(endpoint);
                tracing::debug!(
                    endpoint = endpoint.name(),
                    declared = %endpoint.return_type(),
                    %adapted,
                    ?adapter,
                    "response adapter selected"
                );
                let next = self.compose(&endpoint.returns(adapted), used);
                adapter.bind(endpoint, next)
            }
            None => Arc::new(ObjectStage::new(endpoint.return_type().clone())),
        }
    }
}

impl Default for ResponseAdapters {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for ResponseAdapters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseAdapters").field("adapters", &self.adapters).finish_non_exhaustive()
    }
}

fn default_adapters() -> Vec<Arc<dyn ResponseAdapter>> {
    vec![
        Arc::new(RecoverableEitherAdapter),
        Arc::new(EitherAdapter),
        Arc::new(EffectAdapter),
        Arc::new(OptionAdapter),
        Arc::new(EvalAdapter),
        Arc::new(NonEmptyListAdapter),
        Arc::new(SequenceAdapter),
        Arc::new(FlowAdapter),
        Arc::new(DeferredAdapter),
        Arc::new(JobAdapter),
        Arc::new(CollectionAdapter),
        Arc::new(StreamAdapter),
    ]
}

/// Builder for [`ResponseAdapters`].
#[derive(Default)]
pub struct ResponseAdaptersBuilder {
    adapters: Vec<Arc<dyn ResponseAdapter>>,
}

impl ResponseAdaptersBuilder {
    /// Append an adapter; earlier adapters take precedence.
    pub fn adapter<A: ResponseAdapter + 'static>(mut self, adapter: A) -> Self {
        self.adapters.push(Arc::new(adapter));
        self
    }

    /// Append every built-in adapter.
    pub fn defaults(mut self) -> Self {
        self.adapters.extend(default_adapters());
        self
    }

    pub fn build(self) -> ResponseAdapters {
        ResponseAdapters::new(self.adapters)
    }
}
