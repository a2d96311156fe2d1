//! Body readers used to decode failure responses during recovery.

use crate::error::CallError;
use crate::types::{Type, ANY, STRING};
use crate::value::Value;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// Decodes a response body of some media type into a value of the expected type.
pub trait BodyReader: Send + Sync + fmt::Debug {
    fn supports(&self, media_type: &str, expected: &Type) -> bool;

    fn read(&self, body: &Bytes, media_type: &str, expected: &Type) -> Result<Value, CallError>;
}

/// Ordered set of readers; the first one supporting a request wins.
#[derive(Debug, Clone, Default)]
pub struct BodyReaders {
    readers: Vec<Arc<dyn BodyReader>>,
}

impl BodyReaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON then plain text.
    pub fn with_defaults() -> Self {
        Self::new().with(JsonReader).with(TextReader)
    }

    pub fn with<R: BodyReader + 'static>(mut self, reader: R) -> Self {
        self.readers.push(Arc::new(reader));
        self
    }

    pub fn select(&self, media_type: &str, expected: &Type) -> Option<&dyn BodyReader> {
        self.readers.iter().find(|r| r.supports(media_type, expected)).map(|r| r.as_ref())
    }

    pub fn len(&self) -> usize {
        self.readers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }
}

/// The media type of a `Content-Type` value, without parameters and lowercased.
pub fn media_type(content_type: &str) -> String {
    content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

/// `application/json` and any `+json` structured syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReader;

impl BodyReader for JsonReader {
    fn supports(&self, media_type: &str, _expected: &Type) -> bool {
        media_type == "application/json" || media_type.ends_with("+json")
    }

    fn read(&self, body: &Bytes, media_type: &str, expected: &Type) -> Result<Value, CallError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Absent);
        }
        serde_json::from_slice(body)
            .map(Value::Data)
            .map_err(|e| CallError::decode(media_type, expected, e))
    }
}

/// `text/*` bodies read as strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextReader;

impl BodyReader for TextReader {
    fn supports(&self, media_type: &str, expected: &Type) -> bool {
        media_type.starts_with("text/") && (expected.is(&ANY) || expected.compatible(&STRING))
    }

    fn read(&self, body: &Bytes, media_type: &str, expected: &Type) -> Result<Value, CallError> {
        std::str::from_utf8(body)
            .map(|text| Value::Data(serde_json::Value::String(text.to_owned())))
            .map_err(|e| CallError::decode(media_type, expected, e))
    }
}
