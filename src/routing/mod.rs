//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path segments)
//!     → mux.rs resolve (per-method RouteNode trie)
//!         literal > :param > * at each depth, no backtracking
//!         → RouteMatch { handler, horizon, params } or None
//!     → mux.rs run_middleware (MiddlewareNode trie, root first)
//!         entries with id > horizon are skipped
//!         first Flow::Respond short-circuits
//!     → handler (with path params installed) or 404
//!
//! Route Registration (at startup):
//!     handle_func("GET /users/:id", h) → stamp horizon = last middleware id
//!     handle("/api", m)                → id = last middleware id + 1
//! ```
//!
//! # Design Decisions
//! - Tries are built at startup, immutable at runtime
//! - Configuration mistakes (duplicates, bad methods) are `RouteError`s so
//!   startup fails before the listener binds
//! - Deterministic: same input always matches same route

pub mod middleware;
pub mod mux;
mod tree;

use thiserror::Error;

pub use middleware::{context, Flow, Handler, Middleware};
pub use mux::{HttpMux, Nest, RouteMatch};

/// Route registration failures.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route \"{0}\" already has a handler")]
    Duplicate(String),

    #[error("invalid HTTP method \"{0}\"")]
    InvalidMethod(String),

    #[error("invalid route pattern \"{0}\": expected \"METHOD /path\"")]
    InvalidPattern(String),

    #[error("route \"{pattern}\" names parameter \"{requested}\" where \"{existing}\" is already bound")]
    ParamConflict {
        pattern: String,
        existing: String,
        requested: String,
    },
}
