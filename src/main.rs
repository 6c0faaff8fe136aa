//! remote-mux server.
//!
//! ```text
//!   Client ──▶ axum + tower layers ──▶ HttpMux
//!                                        ├─ GET  /health     (no middleware)
//!                                        ├─ [ApiKeyAuth]     (security.api_key)
//!                                        ├─ POST /remote     RemoteDispatcher → FunctionRegistry
//!                                        └─ GET  /events     SseEndpoint ◀── Notifier
//! ```
//!
//! Usage: `remote-mux [config.toml]`. Without a path the defaults apply.

use std::net::SocketAddr;
use std::path::Path;

use chrono::Utc;
use tokio::net::TcpListener;

use remote_mux::config::{load_config, ServerConfig};
use remote_mux::lifecycle::{build_mux, forward_signals, Shutdown, StartupError};
use remote_mux::observability::{logging, metrics};
use remote_mux::remote::{CallContext, FunctionRegistry, RegistryError, RemoteError, RemoteResult};
use remote_mux::sse::{Broadcaster, Notifier};
use remote_mux::{HttpServer, Value};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => load_config(Path::new(&path)).map_err(StartupError::from)?,
        None => ServerConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "remote-mux starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        remote_path = %config.remote.path,
        sse_path = %config.sse.path,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let broadcaster = Broadcaster::with_event_buffer(config.sse.heartbeat_interval(), config.sse.event_buffer);
    let registry = demo_functions(broadcaster.notifier())?;
    let mux = build_mux(&config, registry, &broadcaster)?;

    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .map_err(|source| StartupError::Bind {
            address: config.listener.bind_address.clone(),
            source,
        })?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    forward_signals(shutdown.clone());
    broadcaster.close_on(&shutdown);

    HttpServer::new(config, mux).run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn echo(_ctx: CallContext, args: Vec<Value>) -> RemoteResult {
    Ok(args.into_iter().next().unwrap_or(Value::Undefined))
}

async fn add(_ctx: CallContext, args: Vec<Value>) -> RemoteResult {
    args.iter().try_fold(0.0, |sum, arg| {
        arg.as_f64()
            .map(|n| sum + n)
            .ok_or_else(|| RemoteError::with_status(400, "add expects numbers"))
    })
    .map(Value::Number)
}

async fn now(_ctx: CallContext, _args: Vec<Value>) -> RemoteResult {
    Ok(Value::date(Utc::now()))
}

fn demo_functions(notifier: Notifier) -> Result<FunctionRegistry, RegistryError> {
    let registry = FunctionRegistry::builder()
        .register("echo", echo)?
        .register("add", add)?
        .register("now", now)?
        .register("broadcast", move |_ctx: CallContext, args: Vec<Value>| {
            let value = args.into_iter().next().unwrap_or(Value::Undefined);
            notifier.notify(&value);
            std::future::ready(RemoteResult::Ok(Value::Undefined))
        })?
        .build();
    Ok(registry)
}
