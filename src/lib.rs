//! Minimal application server runtime.
//!
//! An HTTP router with prefix-scoped middleware, a remote function
//! transport over `multipart/form-data`, and a server-sent events channel.

// Wire formats
pub mod codec;
pub mod multipart;

// Request handling
pub mod http;
pub mod remote;
pub mod routing;
pub mod sse;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use codec::{Blob, RegExp, Value};
pub use config::ServerConfig;
pub use http::{HttpServer, Request};
pub use lifecycle::Shutdown;
pub use remote::{CallContext, FunctionRegistry, RemoteClient, RemoteError, RemoteResult};
pub use routing::{Flow, HttpMux};
pub use sse::{Broadcaster, Notifier};
