//! HTTP handler serving the event stream.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderName};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;

use crate::http::request::Request;
use crate::http::response;
use crate::routing::Handler;
use crate::sse::broadcaster::Broadcaster;

/// Decides whether a request may open the stream.
pub type Authorizer = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Route handler opening one `text/event-stream` per request.
#[derive(Clone)]
pub struct SseEndpoint {
    broadcaster: Broadcaster,
    authorizer: Option<Authorizer>,
}

impl SseEndpoint {
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self {
            broadcaster,
            authorizer: None,
        }
    }

    /// Requests for which `authorize` returns false get 401.
    pub fn with_authorizer<F>(mut self, authorize: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.authorizer = Some(Arc::new(authorize));
        self
    }

    fn open(&self, request: &Request) -> Response {
        if let Some(authorize) = &self.authorizer {
            if !authorize(request) {
                tracing::warn!(request_id = %request.request_id(), "SSE subscription refused");
                return response::unauthorized();
            }
        }

        tracing::debug!(request_id = %request.request_id(), "SSE stream opened");
        (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
                (HeaderName::from_static("x-accel-buffering"), "no"),
            ],
            Body::from_stream(self.broadcaster.event_stream()),
        )
            .into_response()
    }
}

impl Handler for SseEndpoint {
    fn call(&self, request: Request) -> BoxFuture<'static, Response> {
        let response = self.open(&request);
        Box::pin(async move { response })
    }
}
