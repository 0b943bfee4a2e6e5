//! Outbound request descriptor.
//!
//! # Responsibilities
//! - Describe one logical call (method, destination, headers, body)
//! - Derive the breaker key (destination host + logical method)
//! - Carry an optional idempotency override for RPC-style calls

use hyper::body::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Method, Uri};

use crate::resilience::types::BreakerKey;

/// A request as seen by the resilience pipeline.
///
/// Cheap to clone: the body is reference counted, so every retry reuses it.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Logical method name used for breaker partitioning (defaults to the HTTP method).
    pub rpc_method: Option<String>,
    /// Overrides the method-based idempotency classification.
    pub idempotent: Option<bool>,
}

impl RequestDescriptor {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            rpc_method: None,
            idempotent: None,
        }
    }

    pub fn get(uri: Uri) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn post(uri: Uri, body: impl Into<Bytes>) -> Self {
        Self::new(Method::POST, uri).with_body(body)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Partition breaker state by an RPC method name instead of the HTTP method.
    pub fn with_rpc_method(mut self, name: impl Into<String>) -> Self {
        self.rpc_method = Some(name.into());
        self
    }

    pub fn with_idempotency(mut self, idempotent: bool) -> Self {
        self.idempotent = Some(idempotent);
        self
    }

    /// Destination host (authority including port), or empty for relative URIs.
    pub fn host(&self) -> &str {
        self.uri.authority().map(|a| a.as_str()).unwrap_or("")
    }

    pub fn logical_method(&self) -> &str {
        self.rpc_method.as_deref().unwrap_or(self.method.as_str())
    }

    pub fn breaker_key(&self) -> BreakerKey {
        BreakerKey::new(self.host(), self.logical_method())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaker_key_from_http_method() {
        let req = RequestDescriptor::get("http://api.local:8080/users".parse().unwrap());
        let key = req.breaker_key();
        assert_eq!(key.host, "api.local:8080");
        assert_eq!(key.method, "GET");
    }

    #[test]
    fn test_rpc_method_overrides_key() {
        let req = RequestDescriptor::post("http://rpc.local/svc".parse().unwrap(), "{}")
            .with_rpc_method("UserService/Get");
        assert_eq!(req.breaker_key().method, "UserService/Get");
        assert_eq!(req.body, Bytes::from_static(b"{}"));
    }

    #[test]
    fn test_relative_uri_has_empty_host() {
        let req = RequestDescriptor::get("/health".parse().unwrap());
        assert_eq!(req.host(), "");
    }
}
