//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → auth.rs ApiKeyAuth (mounted at "/" when security.api_key is set)
//!         missing/wrong key → 401 "Unauthorized"
//!     → remaining middleware and the route handler
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - The key never appears in logs or Debug output

pub mod auth;

pub use auth::ApiKeyAuth;
