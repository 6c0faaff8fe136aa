//! Value codec subsystem.
//!
//! # Data Flow
//! ```text
//! Encode (reply or client request):
//!     Value tree
//!     → encode.rs (depth-first walk)
//!         Map/Set/Date/RegExp → {"__t": tag, "v": payload}
//!         Binary              → {"__b": n}, bytes pushed as blob n
//!     → JSON text + Vec<Blob> (blob n travels as multipart field `blob-n`)
//!
//! Decode (request argument or client reply):
//!     JSON text + BlobSource
//!     → decode.rs (parse, rebuild tagged envelopes, resolve blob refs)
//!     → Value tree
//! ```
//!
//! # Design Decisions
//! - `Value` is a closed enum; encode/decode are total matches over it
//! - Blob indices live in the `Encoder`, so every request gets its own
//!   dense 0-based numbering
//! - Envelopes are recognised only by their exact key set, so a user object
//!   that merely contains `__t` next to other keys stays a plain object
//! - The codec never logs; callers decide how to surface a `CodecError`

pub mod decode;
pub mod encode;
pub mod error;
pub mod value;

pub use decode::{decode, decode_plain, BlobSource, NoBlobs};
pub use encode::{encode, encode_json, Encoded, Encoder};
pub use error::CodecError;
pub use value::{Blob, RegExp, Value};

/// Envelope key holding the type tag.
pub const TAG_KEY: &str = "__t";
/// Envelope key holding the tagged payload.
pub const PAYLOAD_KEY: &str = "v";
/// Envelope key holding a blob index.
pub const BLOB_KEY: &str = "__b";

/// Multipart field name carrying blob `index`.
pub fn blob_field_name(index: usize) -> String {
    format!("blob-{}", index)
}
