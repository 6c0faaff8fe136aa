//! Wire value model.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::codec::CodecError;

/// Every value kind that can cross the RPC boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    /// Keys in insertion order, as a JavaScript object enumerates them.
    Object(IndexMap<String, Value>),
    /// Ordered key/value entries. Keys may be any value.
    Map(Vec<(Value, Value)>),
    /// Ordered items.
    Set(Vec<Value>),
    Date(DateTime<Utc>),
    RegExp(RegExp),
    Binary(Blob),
}

impl Value {
    /// Build an object from `(key, value)` pairs.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a date truncated to millisecond precision, the resolution of the wire format.
    pub fn date(at: DateTime<Utc>) -> Self {
        let truncated = DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at);
        Value::Date(truncated)
    }

    /// Runtime type name reported in the `Data-Type` reply header.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::Array(_)
            | Value::Object(_)
            | Value::Map(_)
            | Value::Set(_)
            | Value::Date(_)
            | Value::RegExp(_) => "object",
        }
    }

    /// True for values that must travel as an envelope rather than raw text.
    pub fn is_composite(&self) -> bool {
        self.type_name() == "object"
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Value::Binary(blob) => Some(blob),
            _ => None,
        }
    }

    /// Look up an object member.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Text form used for primitive RPC arguments and scalar replies.
    ///
    /// Returns `None` for values that need the envelope encoding.
    pub fn to_primitive_text(&self) -> Option<String> {
        match self {
            Value::Undefined => Some(String::new()),
            Value::Null => Some("null".to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(format_number(*n)),
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

/// Format a number the way a JavaScript peer prints it: integers carry no
/// fractional part, non-finite values use their JS spelling, and magnitudes
/// outside `[1e-6, 1e21)` switch to exponent form (`1e+21`, `1.5e-7`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.abs() >= 1e21 || n.abs() < 1e-6 {
        let text = format!("{:e}", n);
        match text.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{}e+{}", mantissa, exponent)
            }
            _ => text,
        }
    } else {
        n.to_string()
    }
}

/// Parse a number written by [`format_number`] (or any Rust float literal).
pub fn parse_number(text: &str) -> Option<f64> {
    match text.trim() {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        "" => Some(0.0),
        other => other.parse().ok(),
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Blob> for Value {
    fn from(blob: Blob) -> Self {
        Value::Binary(blob)
    }
}

impl From<RegExp> for Value {
    fn from(re: RegExp) -> Self {
        Value::RegExp(re)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(at: DateTime<Utc>) -> Self {
        Value::date(at)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Raw binary payload, optionally named like an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    data: Bytes,
    filename: Option<String>,
}

impl Blob {
    /// Anonymous blob.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            filename: None,
        }
    }

    /// Named file.
    pub fn file(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            filename: Some(filename.into()),
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

/// A regular expression carried by source and flags; it is not compiled here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegExp {
    source: String,
    flags: String,
}

const REGEXP_FLAGS: &str = "dgimsuvy";

impl RegExp {
    pub fn new(source: impl Into<String>, flags: impl Into<String>) -> Result<Self, CodecError> {
        let source = source.into();
        let flags = flags.into();
        if !flags.chars().all(|c| REGEXP_FLAGS.contains(c)) {
            return Err(CodecError::InvalidRegExp(format!("/{}/{}", source, flags)));
        }
        Ok(Self { source, flags })
    }

    /// Parse a `/source/flags` literal.
    pub fn parse(literal: &str) -> Result<Self, CodecError> {
        let invalid = || CodecError::InvalidRegExp(literal.to_string());
        let body = literal.strip_prefix('/').ok_or_else(invalid)?;
        let close = body.rfind('/').ok_or_else(invalid)?;
        Self::new(&body[..close], &body[close + 1..]).map_err(|_| invalid())
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn flags(&self) -> &str {
        &self.flags
    }
}

impl fmt::Display for RegExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags)
    }
}
