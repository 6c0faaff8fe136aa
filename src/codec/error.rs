//! Codec error definitions.

use thiserror::Error;

/// Errors raised while encoding or decoding envelope values.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Text was not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Envelope carried a tag this codec does not know.
    #[error("unknown envelope tag \"{0}\"")]
    UnknownTag(String),

    /// Envelope tag was known but its payload had the wrong shape.
    #[error("malformed {tag} envelope: {reason}")]
    MalformedEnvelope { tag: &'static str, reason: String },

    /// Blob reference pointed at a field the request or reply does not carry.
    #[error("blob reference {0} has no matching field")]
    MissingBlob(u64),

    /// RegExp payload was not a `/source/flags` literal.
    #[error("invalid regular expression literal \"{0}\"")]
    InvalidRegExp(String),

    /// Date payload was not an ISO-8601 timestamp.
    #[error("invalid date \"{0}\"")]
    InvalidDate(String),

    /// JSON number could not be represented as f64.
    #[error("number out of range")]
    InvalidNumber,

    /// Binary values need a multipart companion channel.
    #[error("binary values cannot be encoded without a multipart body")]
    BinaryNotSupported,
}
