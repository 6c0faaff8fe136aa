//! Remote function calls over multipart/form-data.
//!
//! # Data Flow
//! ```text
//! POST <remote.path>
//!   headers: x-func-name, x-func-param-datatypes, multipart boundary
//!     → dispatcher.rs resolve_target (400 protocol / 404 unknown function)
//!     → multipart::parse_stream (size limits, truncation flag)
//!     → build_args: field "N" + hint[N] → Value (blob-N resolved by codec)
//!     → RemoteFunction::call(CallContext, args)
//!     → encode_reply: text/plain | application/json | octet-stream | multipart
//!     → side-channel status/headers from CallContext applied
//!
//! client.rs mirrors the same conventions for outbound calls.
//! ```

pub mod client;
pub mod context;
pub mod dispatcher;
pub mod registry;
pub mod wire;

pub use client::{ClientError, EventFrame, RemoteClient};
pub use context::{CallContext, RemoteError, ResponseParts};
pub use dispatcher::{DispatchError, RemoteDispatcher};
pub use registry::{FunctionRegistry, RegistryBuilder, RegistryError, RemoteFunction, RemoteResult};
pub use wire::{TypeHint, HEADER_DATA_TYPE, HEADER_FUNC_NAME, HEADER_PARAM_TYPES, RESULT_FIELD};
