//! Multipart/form-data subsystem.
//!
//! # Data Flow
//! ```text
//! axum Body::into_data_stream()
//!     → parse_stream (async driver)
//!     → MultipartDecoder::feed per chunk
//!         Searching → AfterDelimiter → Headers → Body → AfterDelimiter ... → Done
//!         ScratchBuffer holds only unconsumed bytes
//!     → FormData (ordered fields, completion flag)
//!
//! Replies / client requests:
//!     MultipartWriter::text / binary → finish() → Bytes
//! ```

pub mod buffer;
pub mod decoder;
pub mod form;
pub mod writer;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use buffer::ScratchBuffer;
pub use decoder::{boundary_from_content_type, parse_stream, MultipartDecoder, Progress};
pub use form::{Field, FieldValue, FilePart, FormData};
pub use writer::MultipartWriter;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Size limits in bytes; 0 disables a limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Limits {
    /// Total bytes fed to the decoder.
    pub max_request_size: usize,
    /// Bytes in one part.
    pub max_field_size: usize,
}

#[derive(Debug, Error)]
pub enum MultipartError {
    #[error("maximum request size ({limit} bytes) reached")]
    RequestTooLarge { limit: usize },

    #[error("maximum field size ({limit} bytes) reached by field \"{name}\"")]
    FieldTooLarge { name: String, limit: usize },

    #[error("part header block exceeds {limit} bytes")]
    HeaderTooLarge { limit: usize },

    #[error("field \"{name}\" is not valid UTF-8 text")]
    InvalidText { name: String },

    #[error("body stream failed: {0}")]
    Stream(#[source] BoxError),
}
