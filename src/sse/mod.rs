//! Server-sent events.
//!
//! # Data Flow
//! ```text
//! GET <sse.path>
//!     → endpoint.rs SseEndpoint (optional authorizer → 401)
//!     → Broadcaster::event_stream
//!         subscribe(callback → mpsc) + heartbeat Sleep
//!         "data:pong\n\n" at once, then on every quiet interval
//!
//! Notifier::notify(value) / Broadcaster::notify(value)
//!     → snapshot of subscribers
//!     → each connection: encode_json → "data:<json>\n\n", heartbeat reset
//!
//! Peer disconnect → body stream dropped → Subscription dropped
//! ```

pub mod broadcaster;
pub mod endpoint;

pub use broadcaster::{Broadcaster, EventStream, Notifier, Subscription, DEFAULT_EVENT_BUFFER, PONG_FRAME};
pub use endpoint::{Authorizer, SseEndpoint};
