use std::collections::HashMap;
use std::net::SocketAddr;

use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, HOST};
use http::{HeaderMap, Method};
use tracing::debug;

use crate::codec::Values;

/// An incoming HTTP request, fully read.
///
/// The listener reads the whole body before dispatch; binders and handlers
/// work on the buffered bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Path without the query string.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub remote_addr: Option<SocketAddr>,
}

impl Request {
    /// Build a request from a method and a request target such as `/users?limit=10`.
    #[must_use]
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            method,
            path: path.to_string(),
            query: query.to_string(),
            headers: HeaderMap::new(),
            body: Vec::new(),
            remote_addr: None,
        }
    }

    /// Add a header. Names or values that are not valid HTTP are dropped.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.append_header(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn append_header(&mut self, name: &str, value: &str) {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(n), Ok(v)) => {
                self.headers.append(n, v);
            }
            _ => debug!(header = %name, "Dropping invalid request header"),
        }
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Media type of the body, lower-cased, without parameters.
    #[must_use]
    pub fn media_type(&self) -> Option<String> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|ct| ct.split(';').next())
            .map(|mt| mt.trim().to_ascii_lowercase())
    }

    /// Full `Content-Type` header value.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    #[must_use]
    pub fn host(&self) -> &str {
        self.header(HOST.as_str()).unwrap_or_default()
    }

    /// Parsed query parameters.
    #[must_use]
    pub fn query_values(&self) -> Values {
        Values::parse(&self.query)
    }

    #[must_use]
    pub fn cookies(&self) -> HashMap<String, String> {
        parse_cookies(&self.headers)
    }
}

fn split_target(target: &str) -> (&str, &str) {
    match target.split_once('?') {
        Some((p, q)) => (p, q),
        None => (target, ""),
    }
}

/// Parse every `Cookie` header into a name → value map.
pub fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .get_all(http::header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|c| c.split(';'))
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("").trim().to_string();
            Some((name.to_string(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_splits_query() {
        let req = Request::new(Method::GET, "/users?a=bb&dd=800");
        assert_eq!(req.path, "/users");
        assert_eq!(req.query, "a=bb&dd=800");
        assert_eq!(req.query_values().get("dd"), Some("800"));
    }

    #[test]
    fn test_media_type() {
        let req = Request::new(Method::POST, "/")
            .with_header("Content-Type", "Multipart/Form-Data; boundary=x");
        assert_eq!(req.media_type().as_deref(), Some("multipart/form-data"));
        assert_eq!(req.content_type(), Some("Multipart/Form-Data; boundary=x"));
    }

    #[test]
    fn test_invalid_header_dropped() {
        let req = Request::new(Method::GET, "/").with_header("bad header", "x");
        assert!(req.headers.is_empty());
    }

    #[test]
    fn test_cookies() {
        let req = Request::new(Method::GET, "/")
            .with_header("Cookie", "a=1; b=two")
            .with_header("Cookie", "c=");
        let cookies = req.cookies();
        assert_eq!(cookies.get("a").map(String::as_str), Some("1"));
        assert_eq!(cookies.get("b").map(String::as_str), Some("two"));
        assert_eq!(cookies.get("c").map(String::as_str), Some(""));
    }
}
