//! Per-call request context.
//!
//! # Responsibilities
//! - Convert the host's `http::Request<Body>` into the mux's `Request`
//! - Split the path into matching segments once, up front
//! - Parse query string and cookies for handlers and middleware
//! - Carry the request id assigned by the tower layer
//!
//! # Design Decisions
//! - The body is an `Option` and can be taken exactly once
//! - Path parameters keep trie-descent order (a `Vec`, not a map)
//! - Extensions are the typed slot middleware uses to hand values forward

use std::collections::HashMap;

use axum::body::Body;
use axum::http::{Extensions, HeaderMap, HeaderValue, Method, Uri};

/// Header carrying the request id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Wildcard tail parameter name.
pub const WILDCARD_PARAM: &str = "wildcard";

#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    segments: Vec<String>,
    path_params: Vec<(String, String)>,
    query: HashMap<String, String>,
    cookies: HashMap<String, String>,
    headers: HeaderMap,
    extensions: Extensions,
    request_id: Option<String>,
    body: Option<Body>,
}

impl Request {
    /// Build a bodiless request from a method and a URI such as `/users/42?x=1`.
    pub fn new(method: Method, uri: &str) -> Self {
        let uri: Uri = uri.parse().unwrap_or_else(|_| Uri::from_static("/"));
        Self::from_parts(method, &uri, HeaderMap::new(), Extensions::new(), None)
    }

    /// Adopt an inbound host request.
    pub fn from_http(request: axum::http::Request<Body>) -> Self {
        let (parts, body) = request.into_parts();
        Self::from_parts(parts.method, &parts.uri, parts.headers, parts.extensions, Some(body))
    }

    fn from_parts(
        method: Method,
        uri: &Uri,
        headers: HeaderMap,
        extensions: Extensions,
        body: Option<Body>,
    ) -> Self {
        let path = normalize_path(uri.path());
        let request_id = headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Self {
            method,
            segments: path_segments(&path),
            path,
            path_params: Vec::new(),
            query: parse_query(uri.query().unwrap_or("")),
            cookies: parse_cookies(&headers),
            headers,
            extensions,
            request_id,
            body,
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            if name == X_REQUEST_ID {
                self.request_id = value.to_str().ok().map(str::to_string);
            }
            self.headers.insert(name, value);
            if name == "cookie" {
                self.cookies = parse_cookies(&self.headers);
            }
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Normalised path without the query string; never empty.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Replace the path, recomputing segments. Used when mounting sub-muxes.
    pub fn set_path(&mut self, path: &str) {
        self.path = normalize_path(path);
        self.segments = path_segments(&self.path);
    }

    pub fn path_params(&self) -> &[(String, String)] {
        &self.path_params
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub(crate) fn set_path_params(&mut self, params: Vec<(String, String)>) {
        self.path_params = params;
    }

    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as text, if present and visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub fn request_id(&self) -> &str {
        self.request_id.as_deref().unwrap_or("unknown")
    }

    /// Take the body. Later calls return `None`.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }
}

/// Path with the query stripped; the empty path becomes `/`.
fn normalize_path(path: &str) -> String {
    let path = path.split('?').next().unwrap_or("");
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

/// Non-empty `/`-separated segments.
pub fn path_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_query(query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

pub fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .get_all("cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|c| c.split(';'))
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("").trim();
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_filter_empty() {
        assert_eq!(path_segments("//a///b/"), vec!["a", "b"]);
        assert!(path_segments("/").is_empty());
    }

    #[test]
    fn test_request_parsing() {
        let req = Request::new(Method::GET, "/users/42?limit=10&name=a%20b")
            .with_header("cookie", "session_id=abc; theme=dark")
            .with_header(X_REQUEST_ID, "req-1");
        assert_eq!(req.path(), "/users/42");
        assert_eq!(req.segments(), ["users", "42"]);
        assert_eq!(req.query().get("name").map(String::as_str), Some("a b"));
        assert_eq!(req.cookie("session_id"), Some("abc"));
        assert_eq!(req.cookie("theme"), Some("dark"));
        assert_eq!(req.request_id(), "req-1");
    }

    #[test]
    fn test_request_id_follows_header() {
        let req = Request::new(Method::GET, "/");
        assert_eq!(req.request_id(), "unknown");

        let req = req.with_header(X_REQUEST_ID, "first").with_header(X_REQUEST_ID, "second");
        assert_eq!(req.request_id(), "second");
        assert_eq!(req.header(X_REQUEST_ID), Some("second"));
    }

    #[test]
    fn test_body_taken_once() {
        let mut req = Request::new(Method::POST, "/").with_body("x");
        assert!(req.take_body().is_some());
        assert!(req.take_body().is_none());
    }

    #[test]
    fn test_set_path() {
        let mut req = Request::new(Method::GET, "/api/users");
        req.set_path("");
        assert_eq!(req.path(), "/");
        assert!(req.segments().is_empty());
    }
}
