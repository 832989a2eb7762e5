use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// One HTTP round trip. Whether this is XHR, fetch, or a test double is the
/// implementor's business - the engine only sees the parsed JSON result.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, method: Method, url: &str, query: &str, body: Option<Value>) -> Result<Value, TransportError>;
}

/// Normalized network failure descriptor. Clone because deduplicated fetches share
/// their outcome between every concurrent caller.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{method} {url} failed with status {status:?}: {message}")]
pub struct TransportError {
    pub method: Method,
    pub url: String,
    pub status: Option<u16>,
    pub message: String,
    /// The request body that failed, when there was one
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl TransportError {
    pub fn new(method: Method, url: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        Self { method, url: url.into(), status, message: message.into(), body: None, headers: Vec::new() }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}
