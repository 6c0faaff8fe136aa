//! Envelope JSON → Value.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value as Json};

use crate::codec::value::{Blob, RegExp};
use crate::codec::{CodecError, Value, BLOB_KEY, PAYLOAD_KEY, TAG_KEY};

/// Supplies the bytes behind `{"__b": n}` references.
pub trait BlobSource {
    fn blob(&self, index: u64) -> Option<Blob>;
}

/// Source for payloads that carry no companion fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBlobs;

impl BlobSource for NoBlobs {
    fn blob(&self, _index: u64) -> Option<Blob> {
        None
    }
}

impl BlobSource for [Blob] {
    fn blob(&self, index: u64) -> Option<Blob> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.get(i))
            .cloned()
    }
}

impl BlobSource for Vec<Blob> {
    fn blob(&self, index: u64) -> Option<Blob> {
        self.as_slice().blob(index)
    }
}

/// Decode envelope JSON, resolving blob references through `blobs`.
pub fn decode(text: &str, blobs: &dyn BlobSource) -> Result<Value, CodecError> {
    let tree: Json = serde_json::from_str(text)?;
    from_json(tree, blobs)
}

/// Decode envelope JSON that must not reference blobs.
pub fn decode_plain(text: &str) -> Result<Value, CodecError> {
    decode(text, &NoBlobs)
}

fn from_json(tree: Json, blobs: &dyn BlobSource) -> Result<Value, CodecError> {
    Ok(match tree {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => Value::Number(n.as_f64().ok_or(CodecError::InvalidNumber)?),
        Json::String(s) => Value::String(s),
        Json::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| from_json(item, blobs))
                .collect::<Result<_, _>>()?,
        ),
        Json::Object(map) => from_object(map, blobs)?,
    })
}

fn from_object(mut map: JsonMap<String, Json>, blobs: &dyn BlobSource) -> Result<Value, CodecError> {
    if map.len() == 1 && map.contains_key(BLOB_KEY) {
        if let Some(index) = map.get(BLOB_KEY).and_then(Json::as_u64) {
            return blobs.blob(index).map(Value::Binary).ok_or(CodecError::MissingBlob(index));
        }
    }

    if map.len() == 2 && map.contains_key(PAYLOAD_KEY) {
        if let Some(Json::String(tag)) = map.get(TAG_KEY) {
            let tag = tag.clone();
            let payload = map.remove(PAYLOAD_KEY).unwrap_or(Json::Null);
            return from_envelope(&tag, payload, blobs);
        }
    }

    let mut out = IndexMap::with_capacity(map.len());
    for (key, item) in map {
        out.insert(key, from_json(item, blobs)?);
    }
    Ok(Value::Object(out))
}

fn from_envelope(tag: &str, payload: Json, blobs: &dyn BlobSource) -> Result<Value, CodecError> {
    match tag {
        "Date" => {
            let text = expect_string("Date", payload)?;
            let at = DateTime::parse_from_rfc3339(&text)
                .map_err(|_| CodecError::InvalidDate(text.clone()))?;
            Ok(Value::Date(at.with_timezone(&Utc)))
        }
        "RegExp" => {
            let text = expect_string("RegExp", payload)?;
            Ok(Value::RegExp(RegExp::parse(&text)?))
        }
        "Set" => {
            let items = expect_array("Set", payload)?;
            Ok(Value::Set(
                items
                    .into_iter()
                    .map(|item| from_json(item, blobs))
                    .collect::<Result<_, _>>()?,
            ))
        }
        "Map" => {
            let entries = expect_array("Map", payload)?;
            let mut pairs = Vec::with_capacity(entries.len());
            for entry in entries {
                let mut pair = expect_array("Map", entry)?;
                if pair.len() != 2 {
                    return Err(CodecError::MalformedEnvelope {
                        tag: "Map",
                        reason: format!("entry has {} elements, expected 2", pair.len()),
                    });
                }
                let item = pair.pop().unwrap_or(Json::Null);
                let key = pair.pop().unwrap_or(Json::Null);
                pairs.push((from_json(key, blobs)?, from_json(item, blobs)?));
            }
            Ok(Value::Map(pairs))
        }
        other => Err(CodecError::UnknownTag(other.to_string())),
    }
}

fn expect_string(tag: &'static str, payload: Json) -> Result<String, CodecError> {
    match payload {
        Json::String(s) => Ok(s),
        other => Err(CodecError::MalformedEnvelope {
            tag,
            reason: format!("expected string payload, got {}", other),
        }),
    }
}

fn expect_array(tag: &'static str, payload: Json) -> Result<Vec<Json>, CodecError> {
    match payload {
        Json::Array(items) => Ok(items),
        other => Err(CodecError::MalformedEnvelope {
            tag,
            reason: format!("expected array payload, got {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;
    use chrono::TimeZone;

    #[test]
    fn test_round_trip_nested() {
        let at = Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap();
        let value = Value::object([
            (
                "m",
                Value::Map(vec![
                    ("k".into(), Value::Set(vec![1.into(), 2.into()])),
                    (Value::date(at), Value::Null),
                ]),
            ),
            ("d", Value::date(at)),
            ("re", Value::RegExp(RegExp::new("^x$", "i").unwrap())),
            ("n", Value::from(-0.25)),
        ]);
        let encoded = encode(&value).unwrap();
        let decoded = decode(&encoded.json, &encoded.blobs).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_blob_round_trip() {
        let value = Value::Array(vec![
            Blob::new(vec![0u8, 159, 146]).into(),
            Blob::file("photo.jpg", vec![7u8; 3]).into(),
        ]);
        let encoded = encode(&value).unwrap();
        let decoded = decode(&encoded.json, &encoded.blobs).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_root_date_is_tagged() {
        let at = Utc.with_ymd_and_hms(2020, 2, 29, 0, 0, 0).unwrap();
        let json = encode(&Value::date(at)).unwrap().json;
        assert_eq!(json, r#"{"__t":"Date","v":"2020-02-29T00:00:00.000Z"}"#);
        assert_eq!(decode_plain(&json).unwrap(), Value::date(at));
    }

    #[test]
    fn test_near_envelopes_stay_plain() {
        let decoded = decode_plain(r#"{"__t":"Date","v":"x","extra":1}"#).unwrap();
        assert_eq!(decoded.get("extra"), Some(&Value::Number(1.0)));

        let decoded = decode_plain(r#"{"__b":"not an index"}"#).unwrap();
        assert_eq!(decoded.get("__b"), Some(&Value::from("not an index")));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode_plain("{"), Err(CodecError::Json(_))));
        assert!(matches!(
            decode_plain(r#"{"__t":"Tuple","v":[]}"#),
            Err(CodecError::UnknownTag(tag)) if tag == "Tuple"
        ));
        assert!(matches!(
            decode_plain(r#"{"__b":3}"#),
            Err(CodecError::MissingBlob(3))
        ));
        assert!(matches!(
            decode_plain(r#"{"__t":"Map","v":[[1]]}"#),
            Err(CodecError::MalformedEnvelope { tag: "Map", .. })
        ));
        assert!(matches!(
            decode_plain(r#"{"__t":"Date","v":"yesterday"}"#),
            Err(CodecError::InvalidDate(_))
        ));
    }
}
