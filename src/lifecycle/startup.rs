//! Startup orchestration.
//!
//! # Responsibilities
//! - Turn a validated `ServerConfig` plus the application's functions into
//!   a ready `HttpMux`
//! - Report every wiring mistake before the listener binds
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Registration order fixes middleware horizons: `/health` is added before
//!   any middleware and therefore bypasses authentication

use thiserror::Error;

use crate::config::{ConfigError, ServerConfig};
use crate::http::request::Request;
use crate::remote::{FunctionRegistry, RegistryError, RemoteDispatcher};
use crate::routing::{HttpMux, RouteError};
use crate::security::ApiKeyAuth;
use crate::sse::{Broadcaster, SseEndpoint};

pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("route registration failed: {0}")]
    Route(#[from] RouteError),

    #[error("function registration failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Wire the health route, authentication, the RPC dispatcher and the event
/// stream into one mux.
pub fn build_mux(
    config: &ServerConfig,
    registry: FunctionRegistry,
    broadcaster: &Broadcaster,
) -> Result<HttpMux, StartupError> {
    let mut mux = HttpMux::new();

    mux.handle_func(&format!("GET {}", HEALTH_PATH), |_request: Request| async { "ok" })?;

    if let Some(key) = &config.security.api_key {
        mux.handle("/", ApiKeyAuth::new(key.clone()));
    }

    tracing::info!(
        path = %config.remote.path,
        functions = registry.len(),
        max_request_size = config.remote.max_request_size,
        max_field_size = config.remote.max_field_size,
        "Mounting remote functions"
    );
    mux.handle(
        &config.remote.path,
        RemoteDispatcher::new(registry, config.remote.limits()),
    );

    tracing::info!(
        path = %config.sse.path,
        heartbeat_ms = config.sse.heartbeat_interval_ms,
        "Mounting event stream"
    );
    mux.handle_func(
        &format!("GET {}", config.sse.path),
        SseEndpoint::new(broadcaster.clone()),
    )?;

    Ok(mux)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Value;
    use crate::remote::{CallContext, RemoteResult};
    use axum::http::{Method, StatusCode};

    async fn ping(_ctx: CallContext, _args: Vec<Value>) -> RemoteResult {
        Ok(Value::from("pong"))
    }

    fn registry() -> FunctionRegistry {
        FunctionRegistry::builder().register("ping", ping).unwrap().build()
    }

    #[tokio::test]
    async fn test_health_bypasses_auth() {
        let mut config = ServerConfig::default();
        config.security.api_key = Some("secret".into());
        let broadcaster = Broadcaster::new(config.sse.heartbeat_interval());
        let mux = build_mux(&config, registry(), &broadcaster).unwrap();

        let response = mux.dispatch(Request::new(Method::GET, "/health")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = mux.dispatch(Request::new(Method::GET, "/events")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(broadcaster.subscriber_count(), 0);

        let response = mux.dispatch(Request::new(Method::POST, "/remote")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_routes_without_key() {
        let config = ServerConfig::default();
        let broadcaster = Broadcaster::new(config.sse.heartbeat_interval());
        let mux = build_mux(&config, registry(), &broadcaster).unwrap();

        let response = mux.dispatch(Request::new(Method::POST, "/remote")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = mux.dispatch(Request::new(Method::GET, "/remote")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_path_conflict_is_startup_error() {
        let mut config = ServerConfig::default();
        config.sse.path = "/health".into();
        let broadcaster = Broadcaster::new(config.sse.heartbeat_interval());
        let err = build_mux(&config, registry(), &broadcaster).unwrap_err();
        assert!(matches!(err, StartupError::Route(RouteError::Duplicate(_))));

        config.sse.path = "/events".into();
        let mux = build_mux(&config, registry(), &broadcaster).unwrap();
        let debug = format!("{:?}", mux);
        assert!(debug.contains("\"GET\"") && debug.contains("last_middleware_id: 1"));
    }
}
