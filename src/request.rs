//! Requests as seen by interceptors, and the interception chain.

use crate::pending::Pending;
use crate::response::BoxResponse;
use bytes::Bytes;
use http::{HeaderMap, Method};
use std::fmt;
use std::sync::Arc;

pub type BoxRequest = Box<dyn HttpRequest>;

/// An executable HTTP request.
///
/// Requests are immutable; the `with_*` methods return a reconfigured copy of the same kind.
pub trait HttpRequest: Send + Sync + fmt::Debug {
    fn path(&self) -> &str;

    fn method(&self) -> &Method;

    fn headers(&self) -> &HeaderMap;

    fn body(&self) -> Option<&Bytes>;

    fn with_path(&self, path: &str) -> BoxRequest;

    fn with_method(&self, method: Method) -> BoxRequest;

    fn with_headers(&self, headers: HeaderMap) -> BoxRequest;

    fn with_body(&self, body: Option<Bytes>) -> BoxRequest;

    /// Send the request. Nothing happens until the returned value is polled.
    fn execute(&self) -> Pending<BoxResponse>;
}

/// Transforms a request before it is executed.
pub trait RequestInterceptor: Send + Sync + fmt::Debug {
    fn intercepts(&self, request: Pending<BoxRequest>) -> Pending<BoxRequest>;
}

/// Interceptors applied in registration order.
#[derive(Debug, Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<I: RequestInterceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

impl RequestInterceptor for InterceptorChain {
    fn intercepts(&self, request: Pending<BoxRequest>) -> Pending<BoxRequest> {
        self.interceptors
            .iter()
            .fold(request, |request, interceptor| interceptor.intercepts(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pending::{self, PendingExt};
    use crate::response::HttpResponse;
    use crate::value::Value;

    #[derive(Debug, Clone)]
    struct FixedRequest {
        path: String,
        method: Method,
        headers: HeaderMap,
        body: Option<Bytes>,
    }

    impl HttpRequest for FixedRequest {
        fn path(&self) -> &str {
            &self.path
        }

        fn method(&self) -> &Method {
            &self.method
        }

        fn headers(&self) -> &HeaderMap {
            &self.headers
        }

        fn body(&self) -> Option<&Bytes> {
            self.body.as_ref()
        }

        fn with_path(&self, path: &str) -> BoxRequest {
            Box::new(Self { path: path.to_owned(), ..self.clone() })
        }

        fn with_method(&self, method: Method) -> BoxRequest {
            Box::new(Self { method, ..self.clone() })
        }

        fn with_headers(&self, headers: HeaderMap) -> BoxRequest {
            Box::new(Self { headers, ..self.clone() })
        }

        fn with_body(&self, body: Option<Bytes>) -> BoxRequest {
            Box::new(Self { body, ..self.clone() })
        }

        fn execute(&self) -> Pending<BoxResponse> {
            pending::done(Box::new(HttpResponse::ok(Value::Unit)) as BoxResponse)
        }
    }

    #[derive(Debug)]
    struct Prefix(&'static str);

    impl RequestInterceptor for Prefix {
        fn intercepts(&self, request: Pending<BoxRequest>) -> Pending<BoxRequest> {
            let prefix = self.0;
            request.transform(move |r| r.with_path(&format!("{prefix}{}", r.path())))
        }
    }

    #[tokio::test]
    async fn interceptors_apply_in_registration_order() {
        let chain = InterceptorChain::new().with(Prefix("/cats")).with(Prefix("/v1"));
        let request: BoxRequest = Box::new(FixedRequest {
            path: "/42".into(),
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
        });

        let intercepted = chain.intercepts(pending::done(request)).await.unwrap();
        assert_eq!(intercepted.path(), "/v1/cats/42");
        assert_eq!(intercepted.method(), &Method::GET);
        assert_eq!(chain.len(), 2);
    }
}
