//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum + tower layers: timeout, request id, trace)
//!     → request.rs (host request → mux Request: segments, query, cookies)
//!     → routing::HttpMux::dispatch
//!     → response.rs (plain-text helpers for 401/404 and errors)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{Request, WILDCARD_PARAM, X_REQUEST_ID};
pub use server::HttpServer;
