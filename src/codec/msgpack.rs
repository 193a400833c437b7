//! MessagePack primitive reader built on `rmp`.
//!
//! The binary hub protocol is positional: a frame is an array whose
//! elements carry no names. Every read therefore takes the *logical* field
//! name so a failure reports `Reading 'target' failed: ...` rather than a
//! bare byte offset.
//!
//! # Example
//!
//! ```
//! use hubwire::codec::MsgPackReader;
//!
//! let bytes = rmp_serde::to_vec(&(1, "send")).unwrap();
//! let mut reader = MsgPackReader::new(&bytes);
//!
//! assert_eq!(reader.read_array_header("frame").unwrap(), 2);
//! assert_eq!(reader.read_int32("messageType").unwrap(), 1);
//! assert_eq!(reader.read_string("target").unwrap(), "send");
//! assert!(reader.is_empty());
//! ```

use std::fmt::Display;

use rmp::decode;
use rmp::Marker;

use crate::error::DecodeError;

/// Cursor over a MessagePack byte buffer.
///
/// Each `read_*` call consumes exactly one value (or one container header)
/// and advances the cursor. The reader never copies the input; strings and
/// binary blobs are copied out only when returned.
#[derive(Debug, Clone)]
pub struct MsgPackReader<'a> {
    buf: &'a [u8],
}

impl<'a> MsgPackReader<'a> {
    /// Create a reader positioned at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Number of unread bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Check if the whole buffer has been consumed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Marker of the next value without consuming it.
    #[inline]
    pub fn peek_marker(&self) -> Option<Marker> {
        self.buf.first().map(|&b| Marker::from_u8(b))
    }

    /// Read an integer that must fit in `i32`.
    pub fn read_int32(&mut self, field: &str) -> Result<i32, DecodeError> {
        decode::read_int(&mut self.buf).map_err(|e| failed(field, "Int32", e))
    }

    /// Read an integer that must fit in `i64`.
    pub fn read_int64(&mut self, field: &str) -> Result<i64, DecodeError> {
        decode::read_int(&mut self.buf).map_err(|e| failed(field, "Int64", e))
    }

    /// Read a boolean.
    pub fn read_bool(&mut self, field: &str) -> Result<bool, DecodeError> {
        decode::read_bool(&mut self.buf).map_err(|e| failed(field, "Boolean", e))
    }

    /// Read a float, widening `f32` to `f64`.
    pub fn read_f64(&mut self, field: &str) -> Result<f64, DecodeError> {
        match self.peek_marker() {
            Some(Marker::F32) => decode::read_f32(&mut self.buf)
                .map(f64::from)
                .map_err(|e| failed(field, "Double", e)),
            _ => decode::read_f64(&mut self.buf).map_err(|e| failed(field, "Double", e)),
        }
    }

    /// Consume a nil value.
    pub fn read_nil(&mut self, field: &str) -> Result<(), DecodeError> {
        decode::read_nil(&mut self.buf).map_err(|e| failed(field, "Nil", e))
    }

    /// Read a UTF-8 string.
    pub fn read_string(&mut self, field: &str) -> Result<String, DecodeError> {
        let len = decode::read_str_len(&mut self.buf).map_err(|e| failed(field, "String", e))?;
        let raw = self.take(len as usize, field)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|e| failed(field, "String", e))
    }

    /// Read a string that may be nil.
    pub fn read_optional_string(&mut self, field: &str) -> Result<Option<String>, DecodeError> {
        if self.peek_marker() == Some(Marker::Null) {
            self.read_nil(field)?;
            return Ok(None);
        }
        self.read_string(field).map(Some)
    }

    /// Read a binary blob.
    pub fn read_bytes(&mut self, field: &str) -> Result<Vec<u8>, DecodeError> {
        let len = decode::read_bin_len(&mut self.buf).map_err(|e| failed(field, "Byte[]", e))?;
        self.take(len as usize, field).map(<[u8]>::to_vec)
    }

    /// Read a map header, returning the number of key/value pairs.
    pub fn read_map_header(&mut self, field: &str) -> Result<usize, DecodeError> {
        let count = decode::read_map_len(&mut self.buf)
            .map_err(|e| DecodeError::new(field, format!("reading map length: {e}")))?;
        // Each pair takes at least two bytes.
        self.check_count(count as usize, 2, field)
    }

    /// Read an array header, returning the element count.
    pub fn read_array_header(&mut self, field: &str) -> Result<usize, DecodeError> {
        let count = decode::read_array_len(&mut self.buf)
            .map_err(|e| DecodeError::new(field, format!("reading array length: {e}")))?;
        self.check_count(count as usize, 1, field)
    }

    /// Skip an extension value (header and payload).
    pub fn skip_ext(&mut self, field: &str) -> Result<(), DecodeError> {
        let meta = decode::read_ext_meta(&mut self.buf).map_err(|e| failed(field, "Extension", e))?;
        self.take(meta.size as usize, field).map(|_| ())
    }

    fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8], DecodeError> {
        if self.buf.len() < len {
            return Err(DecodeError::new(
                field,
                format!("need {} bytes, {} remaining", len, self.buf.len()),
            ));
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Reject container lengths the remaining input cannot possibly hold,
    /// before anything is allocated for them.
    fn check_count(&self, count: usize, min_size: usize, field: &str) -> Result<usize, DecodeError> {
        if count.saturating_mul(min_size) > self.buf.len() {
            return Err(DecodeError::new(
                field,
                format!(
                    "declared {} entries but only {} bytes remain",
                    count,
                    self.buf.len()
                ),
            ));
        }
        Ok(count)
    }
}

fn failed(field: &str, kind: &str, cause: impl Display) -> DecodeError {
    DecodeError::new(field, format!("as {kind}: {cause}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode<T: serde::Serialize>(value: &T) -> Vec<u8> {
        rmp_serde::to_vec(value).unwrap()
    }

    #[test]
    fn test_read_primitives_in_sequence() {
        let bytes = encode(&(7i32, "hello", true, 2.5f64, -300i64));
        let mut reader = MsgPackReader::new(&bytes);

        assert_eq!(reader.read_array_header("frame").unwrap(), 5);
        assert_eq!(reader.read_int32("a").unwrap(), 7);
        assert_eq!(reader.read_string("b").unwrap(), "hello");
        assert!(reader.read_bool("c").unwrap());
        assert_eq!(reader.read_f64("d").unwrap(), 2.5);
        assert_eq!(reader.read_int64("e").unwrap(), -300);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_read_f32_widens() {
        let bytes = encode(&1.5f32);
        let mut reader = MsgPackReader::new(&bytes);
        assert_eq!(reader.read_f64("value").unwrap(), 1.5);
    }

    #[test]
    fn test_read_bytes() {
        let bytes = encode(&serde_bytes_like(&[1, 2, 3]));
        let mut reader = MsgPackReader::new(&bytes);
        assert_eq!(reader.read_bytes("blob").unwrap(), vec![1, 2, 3]);
    }

    // Binary marker without pulling in serde_bytes.
    fn serde_bytes_like(data: &[u8]) -> crate::codec::DynamicValue {
        crate::codec::DynamicValue::Bytes(data.to_vec())
    }

    #[test]
    fn test_optional_string_nil() {
        let bytes = encode(&Option::<String>::None);
        let mut reader = MsgPackReader::new(&bytes);
        assert_eq!(reader.read_optional_string("invocationId").unwrap(), None);
    }

    #[test]
    fn test_optional_string_present() {
        let bytes = encode(&Some("abc"));
        let mut reader = MsgPackReader::new(&bytes);
        assert_eq!(
            reader.read_optional_string("invocationId").unwrap(),
            Some("abc".to_string())
        );
    }

    #[test]
    fn test_type_mismatch_names_field() {
        let bytes = encode(&42i32);
        let mut reader = MsgPackReader::new(&bytes);

        let err = reader.read_string("target").unwrap_err();
        assert_eq!(err.field, "target");
        assert!(err.to_string().starts_with("Reading 'target' failed"));
    }

    #[test]
    fn test_int32_out_of_range() {
        let bytes = encode(&(i64::from(i32::MAX) + 1));
        let mut reader = MsgPackReader::new(&bytes);
        let err = reader.read_int32("messageType").unwrap_err();
        assert_eq!(err.field, "messageType");
    }

    #[test]
    fn test_truncated_string() {
        let mut bytes = encode(&"hello world");
        bytes.truncate(4);
        let mut reader = MsgPackReader::new(&bytes);

        let err = reader.read_string("target").unwrap_err();
        assert_eq!(err.field, "target");
        assert!(err.cause.contains("remaining"));
    }

    #[test]
    fn test_invalid_utf8() {
        // fixstr of length 2 with invalid UTF-8 bytes
        let bytes = [0xa2, 0xff, 0xfe];
        let mut reader = MsgPackReader::new(&bytes);
        assert!(reader.read_string("target").is_err());
    }

    #[test]
    fn test_empty_buffer() {
        let mut reader = MsgPackReader::new(&[]);
        assert!(reader.peek_marker().is_none());
        let err = reader.read_array_header("frame").unwrap_err();
        assert_eq!(err.field, "frame");
    }

    #[test]
    fn test_array_length_larger_than_input() {
        // array32 claiming 0xFFFFFFFF elements, no payload
        let bytes = [0xdd, 0xff, 0xff, 0xff, 0xff];
        let mut reader = MsgPackReader::new(&bytes);
        let err = reader.read_array_header("arguments").unwrap_err();
        assert!(err.cause.contains("declared"));
    }

    #[test]
    fn test_map_header() {
        let mut map = std::collections::BTreeMap::new();
        map.insert("a", "1");
        map.insert("b", "2");
        let bytes = encode(&map);
        let mut reader = MsgPackReader::new(&bytes);
        assert_eq!(reader.read_map_header("headers").unwrap(), 2);
    }

    #[test]
    fn test_skip_ext() {
        // fixext1 type 5, one data byte, then a positive fixint
        let bytes = [0xd4, 0x05, 0xaa, 0x03];
        let mut reader = MsgPackReader::new(&bytes);
        reader.skip_ext("value").unwrap();
        assert_eq!(reader.read_int32("next").unwrap(), 3);
    }
}
