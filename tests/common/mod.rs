#![allow(dead_code)]

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use whiskers::pending::{self, Pending};
use whiskers::readers::BodyReaders;
use whiskers::request::{BoxRequest, HttpRequest};
use whiskers::response::{BoxResponse, FailurePolicy, HttpResponse};
use whiskers::{ResponseError, Value};

/// One scripted server reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(serde_json::Value),
    Empty,
    Failure { status: StatusCode, content_type: Option<&'static str>, body: &'static str },
}

impl Reply {
    pub fn failure(status: StatusCode) -> Self {
        Reply::Failure { status, content_type: None, body: "" }
    }

    pub fn json_failure(status: StatusCode, body: &'static str) -> Self {
        Reply::Failure { status, content_type: Some("application/json"), body }
    }
}

/// An in-memory request replaying scripted replies; counts how often the server was hit.
#[derive(Debug, Clone)]
pub struct StubRequest {
    path: String,
    method: Method,
    headers: HeaderMap,
    body: Option<Bytes>,
    policy: FailurePolicy,
    replies: Arc<Mutex<VecDeque<Reply>>>,
    hits: Arc<AtomicUsize>,
}

impl StubRequest {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            path: "/cats".into(),
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            policy: FailurePolicy::Raise,
            replies: Arc::new(Mutex::new(replies.into())),
            hits: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Failure responses keep the default readers so they can be recovered.
    pub fn recoverable(mut self) -> Self {
        self.policy = FailurePolicy::Recover(BodyReaders::with_defaults());
        self
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn boxed(&self) -> BoxRequest {
        Box::new(self.clone())
    }
}

impl HttpRequest for StubRequest {
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
        let replies = self.replies.clone();
        let hits = self.hits.clone();
        let policy = self.policy.clone();
        pending::from_future(async move {
            hits.fetch_add(1, Ordering::SeqCst);
            let reply = replies.lock().unwrap().pop_front().unwrap_or(Reply::Empty);
            Ok(respond(&policy, reply))
        })
    }
}

fn respond(policy: &FailurePolicy, reply: Reply) -> BoxResponse {
    match reply {
        Reply::Json(data) => Box::new(HttpResponse::ok(Value::from(data))),
        Reply::Empty => {
            Box::new(HttpResponse::new(StatusCode::OK, HeaderMap::new(), Value::Absent))
        }
        Reply::Failure { status, content_type, body } => {
            let mut headers = HeaderMap::new();
            if let Some(content_type) = content_type {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
            policy.respond(ResponseError::new(status, headers, Bytes::from_static(body.as_bytes())))
        }
    }
}
