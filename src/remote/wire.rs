//! RPC wire conventions shared by the dispatcher and the client.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::codec::{blob_field_name, Blob, BlobSource, Encoded, Value};
use crate::multipart::{FieldValue, FilePart, FormData, MultipartWriter};

/// Name of the function to invoke.
pub const HEADER_FUNC_NAME: &str = "x-func-name";
/// JSON array of per-argument type hints.
pub const HEADER_PARAM_TYPES: &str = "x-func-param-datatypes";
/// Runtime type of a single-part reply.
pub const HEADER_DATA_TYPE: &str = "data-type";
/// Field carrying the envelope JSON of a multipart reply.
pub const RESULT_FIELD: &str = "0";

/// Declared type of one positional argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeHint {
    String,
    Number,
    Boolean,
    Object,
    Null,
    Undefined,
}

impl TypeHint {
    /// Hint a client sends for `value`.
    pub fn for_value(value: &Value) -> Self {
        match value {
            Value::Undefined => TypeHint::Undefined,
            Value::Null => TypeHint::Null,
            Value::Bool(_) => TypeHint::Boolean,
            Value::Number(_) => TypeHint::Number,
            Value::String(_) => TypeHint::String,
            _ => TypeHint::Object,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TypeHint::String => "string",
            TypeHint::Number => "number",
            TypeHint::Boolean => "boolean",
            TypeHint::Object => "object",
            TypeHint::Null => "null",
            TypeHint::Undefined => "undefined",
        }
    }

    /// Parse the `x-func-param-datatypes` header value.
    pub fn parse_list(header: &str) -> Option<Vec<TypeHint>> {
        let names: Vec<String> = serde_json::from_str(header).ok()?;
        names.iter().map(|name| name.parse().ok()).collect()
    }

    /// Serialize a hint list for the `x-func-param-datatypes` header.
    pub fn to_header(hints: &[TypeHint]) -> String {
        let names: Vec<&str> = hints.iter().map(TypeHint::as_str).collect();
        serde_json::Value::from(names).to_string()
    }
}

impl FromStr for TypeHint {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "string" => TypeHint::String,
            "number" => TypeHint::Number,
            "boolean" => TypeHint::Boolean,
            "object" => TypeHint::Object,
            "null" => TypeHint::Null,
            "undefined" => TypeHint::Undefined,
            _ => return Err(()),
        })
    }
}

impl fmt::Display for TypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `blob-N` fields of a decoded form back blob references.
impl BlobSource for FormData {
    fn blob(&self, index: u64) -> Option<Blob> {
        let index = usize::try_from(index).ok()?;
        match self.get(&blob_field_name(index))? {
            FieldValue::File(file) => Some(file_blob(file)),
            FieldValue::Text(text) => Some(Blob::new(text.clone().into_bytes())),
        }
    }
}

pub fn file_blob(file: &FilePart) -> Blob {
    match &file.filename {
        Some(name) => Blob::file(name.clone(), file.data.clone()),
        None => Blob::new(file.data.clone()),
    }
}

/// Write `blob-N` fields for every blob of an encoding.
pub fn write_blobs(writer: &mut MultipartWriter, encoded: &Encoded) {
    for (index, blob) in encoded.blobs.iter().enumerate() {
        writer.binary(&blob_field_name(index), blob.filename(), blob.data());
    }
}

/// Multipart body carrying envelope JSON in field `0` plus its blobs.
pub fn multipart_body(encoded: &Encoded) -> (String, Bytes) {
    let mut writer = MultipartWriter::new();
    writer.text(RESULT_FIELD, &encoded.json);
    write_blobs(&mut writer, encoded);
    let content_type = writer.content_type();
    (content_type, writer.finish())
}
