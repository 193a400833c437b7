//! Dynamically-typed argument values.
//!
//! Invocation arguments are untyped on the wire. [`DynamicValue`] holds one
//! decoded argument as a closed tree: scalars, byte blobs, nested arrays
//! and nested string-keyed maps.
//!
//! Binary frames are decoded with [`read_value`]; text frames go through
//! the `Deserialize` impl. Both produce the same tree for the same logical
//! value, except that the JSON encoding has no binary type.

use std::collections::BTreeMap;
use std::fmt;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use rmp::Marker;
use serde::de::{self, DeserializeOwned, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::MsgPackReader;
use crate::error::DecodeError;

/// Default maximum container nesting accepted by [`read_value`].
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Limits applied while decoding untrusted payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Maximum number of nested arrays/maps inside a single value.
    pub max_depth: usize,
}

impl DecodeLimits {
    /// Limits with a custom nesting depth.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// A decoded argument value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DynamicValue {
    /// Nil / null.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Any integer that fits in `i64`.
    Integer(i64),
    /// 32- or 64-bit float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Binary blob (MessagePack only).
    Bytes(Vec<u8>),
    /// Ordered sequence.
    Array(Vec<DynamicValue>),
    /// String-keyed map. Duplicate keys: last one wins.
    Map(BTreeMap<String, DynamicValue>),
}

impl DynamicValue {
    /// Check for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, DynamicValue::Null)
    }

    /// String contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DynamicValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer contents, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DynamicValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert to a JSON value. Binary blobs become base64 strings.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            DynamicValue::Null => Value::Null,
            DynamicValue::Bool(b) => Value::Bool(*b),
            DynamicValue::Integer(i) => Value::from(*i),
            DynamicValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            DynamicValue::String(s) => Value::String(s.clone()),
            DynamicValue::Bytes(b) => Value::String(BASE64_STANDARD.encode(b)),
            DynamicValue::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            DynamicValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Bind this value to a typed Rust value.
    ///
    /// Goes through the JSON form, so a `Bytes` value binds to a base64
    /// `String`, not to `Vec<u8>`.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.to_json())
    }
}

impl From<serde_json::Value> for DynamicValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => DynamicValue::Null,
            Value::Bool(b) => DynamicValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => DynamicValue::Integer(i),
                None => n.as_f64().map_or(DynamicValue::Null, DynamicValue::Float),
            },
            Value::String(s) => DynamicValue::String(s),
            Value::Array(items) => {
                DynamicValue::Array(items.into_iter().map(DynamicValue::from).collect())
            }
            Value::Object(map) => DynamicValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, DynamicValue::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Decode the next value from `reader`.
///
/// `field` names the value in errors; nested values extend it
/// (`arguments[0].user.tags[3]`).
pub fn read_value(
    reader: &mut MsgPackReader<'_>,
    field: &str,
    limits: &DecodeLimits,
) -> Result<DynamicValue, DecodeError> {
    read_value_at(reader, field, 0, limits.max_depth)
}

fn read_value_at(
    reader: &mut MsgPackReader<'_>,
    field: &str,
    depth: usize,
    max_depth: usize,
) -> Result<DynamicValue, DecodeError> {
    let marker = reader
        .peek_marker()
        .ok_or_else(|| DecodeError::new(field, "unexpected end of input"))?;

    match marker {
        Marker::Null => {
            reader.read_nil(field)?;
            Ok(DynamicValue::Null)
        }
        Marker::True | Marker::False => reader.read_bool(field).map(DynamicValue::Bool),
        Marker::FixPos(_)
        | Marker::FixNeg(_)
        | Marker::U8
        | Marker::U16
        | Marker::U32
        | Marker::U64
        | Marker::I8
        | Marker::I16
        | Marker::I32
        | Marker::I64 => reader.read_int64(field).map(DynamicValue::Integer),
        Marker::F32 | Marker::F64 => reader.read_f64(field).map(DynamicValue::Float),
        Marker::FixStr(_) | Marker::Str8 | Marker::Str16 | Marker::Str32 => {
            reader.read_string(field).map(DynamicValue::String)
        }
        Marker::Bin8 | Marker::Bin16 | Marker::Bin32 => {
            reader.read_bytes(field).map(DynamicValue::Bytes)
        }
        Marker::FixArray(_) | Marker::Array16 | Marker::Array32 => {
            check_depth(field, depth, max_depth)?;
            let len = reader.read_array_header(field)?;
            let mut items = Vec::with_capacity(len);
            for i in 0..len {
                let item_field = format!("{field}[{i}]");
                items.push(read_value_at(reader, &item_field, depth + 1, max_depth)?);
            }
            Ok(DynamicValue::Array(items))
        }
        Marker::FixMap(_) | Marker::Map16 | Marker::Map32 => {
            check_depth(field, depth, max_depth)?;
            let count = reader.read_map_header(field)?;
            let mut map = BTreeMap::new();
            for i in 0..count {
                let key = reader.read_string(&format!("{field}.keys[{i}]"))?;
                let value_field = format!("{field}.{key}");
                let value = read_value_at(reader, &value_field, depth + 1, max_depth)?;
                map.insert(key, value);
            }
            Ok(DynamicValue::Map(map))
        }
        Marker::FixExt1
        | Marker::FixExt2
        | Marker::FixExt4
        | Marker::FixExt8
        | Marker::FixExt16
        | Marker::Ext8
        | Marker::Ext16
        | Marker::Ext32 => {
            // Extension types have no argument representation.
            reader.skip_ext(field)?;
            Ok(DynamicValue::Null)
        }
        Marker::Reserved => Err(DecodeError::new(field, "reserved marker 0xc1")),
    }
}

fn check_depth(field: &str, depth: usize, max_depth: usize) -> Result<(), DecodeError> {
    if depth >= max_depth {
        return Err(DecodeError::new(
            field,
            format!("nesting exceeds maximum depth of {max_depth}"),
        ));
    }
    Ok(())
}

impl Serialize for DynamicValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DynamicValue::Null => serializer.serialize_unit(),
            DynamicValue::Bool(b) => serializer.serialize_bool(*b),
            DynamicValue::Integer(i) => serializer.serialize_i64(*i),
            DynamicValue::Float(f) => serializer.serialize_f64(*f),
            DynamicValue::String(s) => serializer.serialize_str(s),
            // Text encodings carry binary as base64, matching `to_json`.
            DynamicValue::Bytes(b) if serializer.is_human_readable() => {
                serializer.serialize_str(&BASE64_STANDARD.encode(b))
            }
            DynamicValue::Bytes(b) => serializer.serialize_bytes(b),
            DynamicValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            DynamicValue::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}

struct DynamicValueVisitor;

impl<'de> Visitor<'de> for DynamicValueVisitor {
    type Value = DynamicValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any argument value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<DynamicValue, E> {
        Ok(match i64::try_from(v) {
            Ok(i) => DynamicValue::Integer(i),
            Err(_) => DynamicValue::Float(v as f64),
        })
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<DynamicValue, E> {
        Ok(DynamicValue::String(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<DynamicValue, E> {
        Ok(DynamicValue::String(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Bytes(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Bytes(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<DynamicValue, D::Error> {
        DynamicValue::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<DynamicValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(1024));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(DynamicValue::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<DynamicValue, A::Error> {
        let mut map = BTreeMap::new();
        while let Some((key, value)) = access.next_entry::<String, DynamicValue>()? {
            map.insert(key, value);
        }
        Ok(DynamicValue::Map(map))
    }
}

impl<'de> Deserialize<'de> for DynamicValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DynamicValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(bytes: &[u8]) -> Result<DynamicValue, DecodeError> {
        let mut reader = MsgPackReader::new(bytes);
        read_value(&mut reader, "value", &DecodeLimits::default())
    }

    #[test]
    fn test_scalars() {
        assert_eq!(decode(&rmp_serde::to_vec(&()).unwrap()).unwrap(), DynamicValue::Null);
        assert_eq!(
            decode(&rmp_serde::to_vec(&true).unwrap()).unwrap(),
            DynamicValue::Bool(true)
        );
        assert_eq!(
            decode(&rmp_serde::to_vec(&-17i8).unwrap()).unwrap(),
            DynamicValue::Integer(-17)
        );
        assert_eq!(
            decode(&rmp_serde::to_vec(&u32::MAX).unwrap()).unwrap(),
            DynamicValue::Integer(i64::from(u32::MAX))
        );
        assert_eq!(
            decode(&rmp_serde::to_vec(&0.25f64).unwrap()).unwrap(),
            DynamicValue::Float(0.25)
        );
        assert_eq!(
            decode(&rmp_serde::to_vec(&"hi").unwrap()).unwrap(),
            DynamicValue::String("hi".into())
        );
    }

    #[test]
    fn test_nested_containers() {
        let original = DynamicValue::Map(BTreeMap::from([
            (
                "tags".to_string(),
                DynamicValue::Array(vec![
                    DynamicValue::String("a".into()),
                    DynamicValue::Integer(2),
                    DynamicValue::Null,
                ]),
            ),
            ("blob".to_string(), DynamicValue::Bytes(vec![0, 1, 2])),
            ("ok".to_string(), DynamicValue::Bool(false)),
        ]));

        let bytes = rmp_serde::to_vec(&original).unwrap();
        assert_eq!(decode(&bytes).unwrap(), original);
    }

    #[test]
    fn test_duplicate_map_keys_last_wins() {
        // {"k": 1, "k": 2}
        let bytes = [0x82, 0xa1, b'k', 0x01, 0xa1, b'k', 0x02];
        let value = decode(&bytes).unwrap();
        assert_eq!(
            value,
            DynamicValue::Map(BTreeMap::from([("k".to_string(), DynamicValue::Integer(2))]))
        );
    }

    #[test]
    fn test_extension_skipped_as_null() {
        // [fixext1(type 1, 0xff), 5]
        let bytes = [0x92, 0xd4, 0x01, 0xff, 0x05];
        let value = decode(&bytes).unwrap();
        assert_eq!(
            value,
            DynamicValue::Array(vec![DynamicValue::Null, DynamicValue::Integer(5)])
        );
    }

    #[test]
    fn test_depth_limit() {
        // 10 nested single-element arrays around an integer
        let mut bytes = vec![0x91; 10];
        bytes.push(0x01);

        let mut reader = MsgPackReader::new(&bytes);
        let err = read_value(&mut reader, "arguments[0]", &DecodeLimits::with_max_depth(4))
            .unwrap_err();
        assert!(err.cause.contains("maximum depth of 4"));
        assert_eq!(err.field, "arguments[0][0][0][0][0]");

        let mut reader = MsgPackReader::new(&bytes);
        assert!(read_value(&mut reader, "arguments[0]", &DecodeLimits::with_max_depth(10)).is_ok());
    }

    #[test]
    fn test_error_field_path() {
        // {"user": [1, <truncated str8>]}
        let bytes = [0x81, 0xa4, b'u', b's', b'e', b'r', 0x92, 0x01, 0xd9, 0x05, b'a'];
        let err = decode(&bytes).unwrap_err();
        assert_eq!(err.field, "value.user[1]");
    }

    #[test]
    fn test_reserved_marker() {
        let err = decode(&[0xc1]).unwrap_err();
        assert!(err.cause.contains("reserved"));
    }

    #[test]
    fn test_to_json() {
        let value = DynamicValue::Array(vec![
            DynamicValue::Integer(1),
            DynamicValue::Float(1.5),
            DynamicValue::Bytes(b"hi".to_vec()),
            DynamicValue::Map(BTreeMap::from([("a".to_string(), DynamicValue::Null)])),
        ]);
        assert_eq!(value.to_json(), json!([1, 1.5, "aGk=", {"a": null}]));
    }

    #[test]
    fn test_serialize_bytes_per_format() {
        let value = DynamicValue::Bytes(vec![1, 2, 3]);

        assert_eq!(serde_json::to_value(&value).unwrap(), json!("AQID"));
        assert_eq!(decode(&rmp_serde::to_vec(&value).unwrap()).unwrap(), value);
    }

    #[test]
    fn test_accessors() {
        assert!(DynamicValue::Null.is_null());
        assert!(!DynamicValue::Bool(false).is_null());
        assert!(DynamicValue::default().is_null());

        assert_eq!(DynamicValue::String("x".into()).as_str(), Some("x"));
        assert_eq!(DynamicValue::Integer(1).as_str(), None);

        assert_eq!(DynamicValue::Integer(-4).as_i64(), Some(-4));
        assert_eq!(DynamicValue::Float(4.0).as_i64(), None);
    }

    #[test]
    fn test_from_json() {
        let value = DynamicValue::from(json!({"n": 3, "f": 0.5, "s": "x", "l": [true, null]}));
        assert_eq!(
            value,
            DynamicValue::Map(BTreeMap::from([
                ("f".to_string(), DynamicValue::Float(0.5)),
                (
                    "l".to_string(),
                    DynamicValue::Array(vec![DynamicValue::Bool(true), DynamicValue::Null])
                ),
                ("n".to_string(), DynamicValue::Integer(3)),
                ("s".to_string(), DynamicValue::String("x".into())),
            ]))
        );
    }

    #[test]
    fn test_deserialize_from_json_text() {
        let value: DynamicValue = serde_json::from_str(r#"{"a":[1,2.5,"x"]}"#).unwrap();
        assert_eq!(value, DynamicValue::from(json!({"a": [1, 2.5, "x"]})));
    }

    #[test]
    fn test_deserialize_into_struct() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Chat {
            user: String,
            count: u32,
        }

        let value = DynamicValue::from(json!({"user": "ann", "count": 4}));
        let chat: Chat = value.deserialize_into().unwrap();
        assert_eq!(
            chat,
            Chat {
                user: "ann".into(),
                count: 4
            }
        );
    }
}
