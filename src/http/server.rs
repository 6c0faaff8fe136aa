//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router whose fallback hands every request to the mux
//! - Wire up middleware (timeout, request ID, tracing)
//! - Bind server to listener and shut down gracefully
//! - Record per-request metrics

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Request as HostRequest, State};
use axum::response::Response;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::http::request::Request;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::routing::HttpMux;

/// HTTP server hosting one `HttpMux`.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
}

impl HttpServer {
    pub fn new(config: ServerConfig, mux: HttpMux) -> Self {
        let router = Self::build_router(&config, Arc::new(mux));
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, mux: Arc<HttpMux>) -> Router {
        Router::new()
            .fallback(dispatch_handler)
            .with_state(mux)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` is triggered, then drain in-flight
    /// requests.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

async fn dispatch_handler(State(mux): State<Arc<HttpMux>>, request: HostRequest) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();

    let response = mux.dispatch(Request::from_http(request)).await;

    metrics::record_request(&method, response.status().as_u16(), start);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_fallback_dispatches_and_sets_request_id() {
        let mut mux = HttpMux::new();
        mux.handle_func("GET /users/:id", |request: Request| async move {
            format!("{} {}", request.path_param("id").unwrap_or(""), request.request_id())
        })
        .unwrap();
        let router = HttpServer::new(ServerConfig::default(), mux).into_router();

        let request = axum::http::Request::get("/users/42").body(Body::empty()).unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let request_id = response.headers()["x-request-id"].to_str().unwrap().to_string();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, format!("42 {}", request_id).as_bytes());

        let request = axum::http::Request::get("/nope").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
