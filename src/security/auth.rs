//! Shared-secret authentication middleware.

use axum::http::header::AUTHORIZATION;
use futures_util::future::BoxFuture;

use crate::http::request::Request;
use crate::http::response;
use crate::routing::{Flow, Middleware};

pub const X_API_KEY: &str = "x-api-key";

/// Answers 401 unless the request carries the configured key, either in
/// `x-api-key` or as `Authorization: Bearer <key>`.
#[derive(Clone)]
pub struct ApiKeyAuth {
    key: String,
}

impl ApiKeyAuth {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn is_authorized(&self, request: &Request) -> bool {
        if request.header(X_API_KEY) == Some(self.key.as_str()) {
            return true;
        }
        request
            .header(AUTHORIZATION.as_str())
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|token| token == self.key)
    }
}

impl std::fmt::Debug for ApiKeyAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyAuth").field("key", &"<redacted>").finish()
    }
}

impl Middleware for ApiKeyAuth {
    fn call(&self, request: Request) -> BoxFuture<'static, Flow> {
        let flow = if self.is_authorized(&request) {
            Flow::Next(request)
        } else {
            tracing::warn!(
                request_id = %request.request_id(),
                method = %request.method(),
                path = %request.path(),
                "Missing or invalid API key"
            );
            Flow::Respond(response::unauthorized())
        };
        Box::pin(async move { flow })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, StatusCode};

    #[tokio::test]
    async fn test_api_key_checked() {
        let auth = ApiKeyAuth::new("secret");

        let flow = auth.call(Request::new(Method::GET, "/")).await;
        assert!(matches!(flow, Flow::Respond(ref r) if r.status() == StatusCode::UNAUTHORIZED));

        let request = Request::new(Method::GET, "/").with_header(X_API_KEY, "secret");
        assert!(matches!(auth.call(request).await, Flow::Next(_)));

        let request = Request::new(Method::GET, "/").with_header("authorization", "Bearer secret");
        assert!(matches!(auth.call(request).await, Flow::Next(_)));

        let request = Request::new(Method::GET, "/").with_header("authorization", "Bearer other");
        assert!(matches!(auth.call(request).await, Flow::Respond(_)));
    }
}
