//! Requests, responses, and the network port.

use crate::cache::CacheEntry;
use crate::error::{ServiceWorkerError, SwResult};
use async_trait::async_trait;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// An intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Request method, upper case.
    pub method: String,

    /// Request URL.
    pub url: Url,

    /// Request headers.
    pub headers: HashMap<String, String>,

    /// Is navigation request.
    pub is_navigation: bool,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            headers: HashMap::new(),
            is_navigation: false,
        }
    }

    /// Parse a URL and create a GET request for it.
    pub fn parse_get(url: &str) -> SwResult<Self> {
        Ok(Self::get(Url::parse(url)?))
    }

    /// Set the method.
    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_ascii_uppercase();
        self
    }

    /// Add a header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Identity used to store this request in a cache bucket.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.method, self.url.as_str())
    }
}

/// Request identity inside a cache bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub method: String,
    pub url: String,
}

impl CacheKey {
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
        }
    }

    /// GET key for a URL.
    pub fn get(url: &str) -> Self {
        Self::new("GET", url)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Response tainting, as reported by the network layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response.
    #[default]
    Basic,
    /// Cross-origin response with CORS.
    Cors,
    /// Cross-origin response without CORS.
    Opaque,
    /// Network error.
    Error,
}

/// A response returned to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code.
    pub status: u16,

    /// Status text.
    pub status_text: String,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Tainting of the response.
    pub response_type: ResponseType,

    /// Whether the response followed a redirect.
    pub redirected: bool,

    /// Whether from cache.
    pub from_cache: bool,
}

impl Response {
    /// Create a same-origin response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: status_text(status).to_string(),
            headers: HashMap::new(),
            body: body.into(),
            response_type: ResponseType::Basic,
            redirected: false,
            from_cache: false,
        }
    }

    /// Create a network error response.
    pub fn network_error() -> Self {
        Self {
            status: 0,
            status_text: "Network Error".to_string(),
            headers: HashMap::new(),
            body: Vec::new(),
            response_type: ResponseType::Error,
            redirected: false,
            from_cache: false,
        }
    }

    /// Create a response from cache entry.
    pub fn from_cache(entry: &CacheEntry) -> Self {
        Self {
            status: entry.status,
            status_text: status_text(entry.status).to_string(),
            headers: entry.headers.clone(),
            body: entry.body.clone(),
            response_type: entry.response_type,
            redirected: entry.redirected,
            from_cache: true,
        }
    }

    /// Set the response type.
    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Mark the response as redirected.
    pub fn redirected(mut self) -> Self {
        self.redirected = true;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Status in the 200-299 range.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> SwResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| ServiceWorkerError::Network(e.to_string()))
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}

/// Outbound network access.
#[async_trait]
pub trait NetworkPort: Send + Sync {
    /// Perform a request. HTTP error statuses resolve; only transport
    /// failures are errors.
    async fn fetch(&self, request: &Request) -> SwResult<Response>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_includes_method() {
        let get = Request::parse_get("https://example.com/a.js").unwrap();
        let head = get.clone().with_method("head");

        assert_eq!(get.cache_key(), CacheKey::get("https://example.com/a.js"));
        assert_ne!(get.cache_key(), head.cache_key());
        assert_eq!(head.cache_key().to_string(), "HEAD https://example.com/a.js");
    }

    #[test]
    fn test_parse_get_rejects_garbage() {
        assert!(matches!(
            Request::parse_get("not a url"),
            Err(ServiceWorkerError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_response_ok_range() {
        assert!(Response::new(200, "").ok());
        assert!(Response::new(204, "").ok());
        assert!(!Response::new(304, "").ok());
        assert!(!Response::new(500, "").ok());
        assert!(!Response::network_error().ok());
    }

    #[test]
    fn test_response_json() {
        let response = Response::new(200, r#"[{"id":"7"}]"#);
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value[0]["id"], "7");
    }
}
