//! Value → envelope JSON.

use serde_json::{Map as JsonMap, Number, Value as Json};

use crate::codec::value::Blob;
use crate::codec::{CodecError, Value, BLOB_KEY, PAYLOAD_KEY, TAG_KEY};

/// Result of encoding one value tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    pub json: String,
    /// Blob `n` of this list is referenced as `{"__b": n}` in `json`.
    pub blobs: Vec<Blob>,
}

/// Stateful encoder.
///
/// One encoder numbers blobs densely across every value passed to it, so a
/// client encoding several arguments of the same call shares one instance
/// and a fresh call starts from blob 0 again.
#[derive(Debug)]
pub struct Encoder {
    blobs: Vec<Blob>,
    allow_blobs: bool,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            blobs: Vec::new(),
            allow_blobs: true,
        }
    }

    /// Encoder that fails with [`CodecError::BinaryNotSupported`] on binary values.
    pub fn json_only() -> Self {
        Self {
            blobs: Vec::new(),
            allow_blobs: false,
        }
    }

    /// Encode one value to JSON text, collecting its blobs.
    pub fn encode(&mut self, value: &Value) -> Result<String, CodecError> {
        let tree = self.element(value)?;
        Ok(serde_json::to_string(&tree)?)
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    pub fn into_blobs(self) -> Vec<Blob> {
        self.blobs
    }

    /// Array slots and the root keep undefined as null.
    fn element(&mut self, value: &Value) -> Result<Json, CodecError> {
        Ok(self.member(value)?.unwrap_or(Json::Null))
    }

    /// Object members drop undefined entirely.
    fn member(&mut self, value: &Value) -> Result<Option<Json>, CodecError> {
        let json = match value {
            Value::Undefined => return Ok(None),
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => number(*n),
            Value::String(s) => Json::String(s.clone()),
            Value::Array(items) => Json::Array(
                items
                    .iter()
                    .map(|item| self.element(item))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => {
                let mut out = JsonMap::new();
                for (key, item) in map {
                    if let Some(json) = self.member(item)? {
                        out.insert(key.clone(), json);
                    }
                }
                Json::Object(out)
            }
            Value::Map(entries) => {
                let mut pairs = Vec::with_capacity(entries.len());
                for (key, item) in entries {
                    pairs.push(Json::Array(vec![self.element(key)?, self.element(item)?]));
                }
                tagged("Map", Json::Array(pairs))
            }
            Value::Set(items) => {
                let items = items
                    .iter()
                    .map(|item| self.element(item))
                    .collect::<Result<_, _>>()?;
                tagged("Set", Json::Array(items))
            }
            Value::Date(at) => tagged(
                "Date",
                Json::String(at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
            ),
            Value::RegExp(re) => tagged("RegExp", Json::String(re.to_string())),
            Value::Binary(blob) => {
                if !self.allow_blobs {
                    return Err(CodecError::BinaryNotSupported);
                }
                let index = self.blobs.len();
                self.blobs.push(blob.clone());
                let mut out = JsonMap::new();
                out.insert(BLOB_KEY.to_string(), Json::from(index));
                Json::Object(out)
            }
        };
        Ok(Some(json))
    }
}

/// Encode a single value with a fresh blob counter.
pub fn encode(value: &Value) -> Result<Encoded, CodecError> {
    let mut encoder = Encoder::new();
    let json = encoder.encode(value)?;
    Ok(Encoded {
        json,
        blobs: encoder.into_blobs(),
    })
}

/// Encode a value that must not contain binary data (SSE payloads).
pub fn encode_json(value: &Value) -> Result<String, CodecError> {
    Encoder::json_only().encode(value)
}

fn tagged(tag: &str, payload: Json) -> Json {
    let mut out = JsonMap::new();
    out.insert(TAG_KEY.to_string(), Json::String(tag.to_string()));
    out.insert(PAYLOAD_KEY.to_string(), payload);
    Json::Object(out)
}

/// Integral values print without a fraction; non-finite values become null.
fn number(n: f64) -> Json {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE {
        Json::from(n as i64)
    } else {
        Number::from_f64(n).map(Json::Number).unwrap_or(Json::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RegExp;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_tagged_shapes() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let value = Value::object([
            ("when", Value::date(at)),
            ("re", Value::RegExp(RegExp::new("a+", "g").unwrap())),
            ("set", Value::Set(vec![1.into(), 2.into()])),
        ]);
        let json = encode(&value).unwrap().json;
        assert_eq!(
            json,
            r#"{"when":{"__t":"Date","v":"2024-01-02T03:04:05.000Z"},"re":{"__t":"RegExp","v":"/a+/g"},"set":{"__t":"Set","v":[1,2]}}"#
        );
    }

    #[test]
    fn test_object_keys_keep_insertion_order() {
        let value = Value::object([
            ("zeta", Value::from(1)),
            ("alpha", Blob::new(vec![0u8]).into()),
            ("mid", Blob::new(vec![1u8]).into()),
        ]);
        let encoded = encode(&value).unwrap();
        assert_eq!(encoded.json, r#"{"zeta":1,"alpha":{"__b":0},"mid":{"__b":1}}"#);
        assert_eq!(&encoded.blobs[0].data()[..], &[0u8]);

        let decoded = crate::codec::decode(&encoded.json, &encoded.blobs).unwrap();
        let keys: Vec<&str> = decoded
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_undefined_handling() {
        let value = Value::object([
            ("gone", Value::Undefined),
            ("list", Value::Array(vec![Value::Undefined, 1.5.into()])),
        ]);
        assert_eq!(encode(&value).unwrap().json, r#"{"list":[null,1.5]}"#);
        assert_eq!(encode(&Value::Undefined).unwrap().json, "null");
        assert_eq!(encode(&Value::Number(f64::NAN)).unwrap().json, "null");
    }

    #[test]
    fn test_blob_numbering_is_dense() {
        let value = Value::Array(vec![
            Blob::new(vec![1u8]).into(),
            Value::object([
                ("inner", Blob::file("a.bin", vec![2u8]).into()),
                ("deep", Value::object([("last", Blob::file("c.bin", vec![3u8]).into())])),
            ]),
        ]);
        let encoded = encode(&value).unwrap();
        assert_eq!(
            encoded.json,
            r#"[{"__b":0},{"inner":{"__b":1},"deep":{"last":{"__b":2}}}]"#
        );
        assert_eq!(encoded.blobs.len(), 3);
        assert_eq!(encoded.blobs[1].filename(), Some("a.bin"));
        assert_eq!(encoded.blobs[2].filename(), Some("c.bin"));
        assert_eq!(&encoded.blobs[2].data()[..], &[3u8]);

        assert!(encode(&Value::from("no blobs")).unwrap().blobs.is_empty());
    }

    #[test]
    fn test_shared_encoder_continues_numbering() {
        let mut encoder = Encoder::new();
        encoder.encode(&Blob::new(vec![0u8]).into()).unwrap();
        let second = encoder.encode(&Blob::new(vec![0u8]).into()).unwrap();
        assert_eq!(second, r#"{"__b":1}"#);
        assert_eq!(encoder.blob_count(), 2);
    }

    #[test]
    fn test_json_only_rejects_binary() {
        let err = encode_json(&Blob::new(vec![1u8]).into()).unwrap_err();
        assert!(matches!(err, CodecError::BinaryNotSupported));
        assert_eq!(encode_json(&42.into()).unwrap(), "42");
    }
}
