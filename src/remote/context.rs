//! Per-call context handed to remote functions.
//!
//! # Responsibilities
//! - Read-only snapshot of the inbound request (headers, cookies, query,
//!   extensions set by middleware)
//! - Response side-channel: status and headers a function wants on its reply
//!
//! # Design Decisions
//! - One context per call, never shared between requests
//! - The side-channel sits behind a `Mutex` because a function may move
//!   clones of its context into spawned tasks

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::http::{Extensions, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use thiserror::Error;

use crate::http::request::Request;

/// Error returned by a remote function. Only `message` reaches the client.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RemoteError {
    message: String,
    status: Option<StatusCode>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    /// Error with an explicit reply status; out-of-range codes become 500.
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Some(clamp_status(status)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }
}

impl From<String> for RemoteError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for RemoteError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Status and headers collected through the side-channel.
#[derive(Debug, Clone, Default)]
pub struct ResponseParts {
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
}

#[derive(Debug)]
struct RequestSnapshot {
    method: Method,
    path: String,
    request_id: String,
    headers: HeaderMap,
    cookies: HashMap<String, String>,
    query: HashMap<String, String>,
    path_params: Vec<(String, String)>,
    extensions: Extensions,
}

#[derive(Debug, Clone)]
pub struct CallContext {
    request: Arc<RequestSnapshot>,
    response: Arc<Mutex<ResponseParts>>,
}

impl CallContext {
    pub fn new(request: &Request) -> Self {
        Self {
            request: Arc::new(RequestSnapshot {
                method: request.method().clone(),
                path: request.path().to_string(),
                request_id: request.request_id().to_string(),
                headers: request.headers().clone(),
                cookies: request.cookies().clone(),
                query: request.query().clone(),
                path_params: request.path_params().to_vec(),
                extensions: request.extensions().clone(),
            }),
            response: Arc::new(Mutex::new(ResponseParts::default())),
        }
    }

    pub fn method(&self) -> &Method {
        &self.request.method
    }

    pub fn path(&self) -> &str {
        &self.request.path
    }

    pub fn request_id(&self) -> &str {
        &self.request.request_id
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.request.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.request.cookies.get(name).map(String::as_str)
    }

    pub fn query(&self) -> &HashMap<String, String> {
        &self.request.query
    }

    pub fn path_params(&self) -> &[(String, String)] {
        &self.request.path_params
    }

    /// Typed value stored by middleware (for example `routing::context`).
    pub fn extension<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.request.extensions.get::<T>().cloned()
    }

    /// Reply status for this call. Codes outside 100..=599 become 500.
    pub fn set_status(&self, status: u16) {
        self.parts().status = Some(clamp_status(status));
    }

    /// Add a reply header. Invalid names or values are dropped with a warning.
    pub fn set_header(&self, name: &str, value: &str) {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.parts().headers.append(name, value);
            }
            _ => tracing::warn!(
                request_id = %self.request_id(),
                header = %name,
                "Dropping invalid response header"
            ),
        }
    }

    /// Drain the side-channel.
    pub fn take_response_parts(&self) -> ResponseParts {
        std::mem::take(&mut *self.parts())
    }

    fn parts(&self) -> std::sync::MutexGuard<'_, ResponseParts> {
        self.response.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn clamp_status(status: u16) -> StatusCode {
    if (100..=599).contains(&status) {
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
