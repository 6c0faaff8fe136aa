//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use remote_mux::config::ServerConfig;
use remote_mux::lifecycle::{build_mux, Shutdown};
use remote_mux::remote::{CallContext, FunctionRegistry, RemoteError, RemoteResult};
use remote_mux::sse::Broadcaster;
use remote_mux::{HttpServer, RemoteClient, Value};

/// A server bound to an ephemeral port on 127.0.0.1.
pub struct TestServer {
    pub addr: SocketAddr,
    pub broadcaster: Broadcaster,
    pub config: ServerConfig,
    shutdown: Shutdown,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn client(&self) -> RemoteClient {
        RemoteClient::new(self.url(&self.config.remote.path))
    }

    /// Trigger graceful shutdown and wait for the server task.
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }

    /// Trigger graceful shutdown; true when the server task ends within `limit`.
    pub async fn stop_within(self, limit: Duration) -> bool {
        self.shutdown.trigger();
        tokio::time::timeout(limit, self.handle).await.is_ok()
    }
}

async fn echo(_ctx: CallContext, args: Vec<Value>) -> RemoteResult {
    Ok(args.into_iter().next().unwrap_or(Value::Undefined))
}

async fn add(_ctx: CallContext, args: Vec<Value>) -> RemoteResult {
    let sum = args.iter().filter_map(Value::as_f64).sum::<f64>();
    Ok(Value::Number(sum))
}

async fn conflict(ctx: CallContext, _args: Vec<Value>) -> RemoteResult {
    ctx.set_header("x-reason", "duplicate");
    ctx.set_status(409);
    Err(RemoteError::new("already exists"))
}

async fn created(ctx: CallContext, _args: Vec<Value>) -> RemoteResult {
    ctx.set_status(201);
    Ok(Value::from("made"))
}

async fn whoami(ctx: CallContext, _args: Vec<Value>) -> RemoteResult {
    Ok(ctx.cookie("user").map(Value::from).unwrap_or(Value::Null))
}

pub fn test_registry(broadcaster: &Broadcaster) -> FunctionRegistry {
    let notifier = broadcaster.notifier();
    FunctionRegistry::builder()
        .register("echo", echo)
        .and_then(|b| b.register("add", add))
        .and_then(|b| b.register("conflict", conflict))
        .and_then(|b| b.register("created", created))
        .and_then(|b| b.register("whoami", whoami))
        .and_then(|b| {
            b.register("broadcast", move |_ctx: CallContext, args: Vec<Value>| {
                let value = args.into_iter().next().unwrap_or(Value::Undefined);
                notifier.notify(&value);
                std::future::ready(RemoteResult::Ok(Value::Undefined))
            })
        })
        .unwrap()
        .build()
}

pub async fn start_server(config: ServerConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let broadcaster = Broadcaster::with_event_buffer(config.sse.heartbeat_interval(), config.sse.event_buffer);
    let mux = build_mux(&config, test_registry(&broadcaster), &broadcaster).unwrap();

    let shutdown = Shutdown::new();
    broadcaster.close_on(&shutdown);
    let server = HttpServer::new(config.clone(), mux);
    let signal = shutdown.clone();
    let handle = tokio::spawn(async move {
        server.run(listener, signal).await.unwrap();
    });

    TestServer {
        addr,
        broadcaster,
        config,
        shutdown,
        handle,
    }
}
