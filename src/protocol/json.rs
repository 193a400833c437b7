//! JSON text protocol.
//!
//! A text frame is a JSON object terminated by the ASCII record separator
//! (`0x1E`). Decoding is deliberately lenient: anything that is not a
//! recognized message yields `None` so newer protocol versions can add
//! message kinds without breaking older gateways.

use serde_json::{Map, Value};

use super::message::{
    CloseConnectionMessage, InvocationMessage, OpenConnectionMessage, ServerlessMessage,
    CLOSE_CONNECTION_MESSAGE_TYPE, INVOCATION_MESSAGE_TYPE, OPEN_CONNECTION_MESSAGE_TYPE,
};

/// Record separator terminating every text frame.
pub const RECORD_SEPARATOR: u8 = 0x1e;

const TYPE_PROPERTY: &str = "type";

/// Properties bound by name, regardless of how the sender cased them.
const KNOWN_PROPERTIES: [&str; 5] = [TYPE_PROPERTY, "invocationId", "target", "arguments", "error"];

/// JSON hub protocol decoder.
pub struct JsonProtocol;

impl JsonProtocol {
    /// Decode one text frame.
    ///
    /// Only the bytes before the first record separator are parsed; a buffer
    /// without a separator is parsed whole.
    pub fn try_decode(buffer: &[u8]) -> Option<ServerlessMessage> {
        let payload = Self::split_record(buffer);

        let value: Value = match serde_json::from_slice(payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("Text frame is not valid JSON: {}", e);
                return None;
            }
        };

        let Value::Object(object) = value else {
            tracing::debug!("Text frame is not a JSON object");
            return None;
        };
        let object = Self::canonicalize_keys(object);

        let message_type = object
            .get(TYPE_PROPERTY)
            .and_then(Value::as_i64)
            .and_then(|t| i32::try_from(t).ok())?;
        let value = Value::Object(object);

        let decoded = match message_type {
            INVOCATION_MESSAGE_TYPE => serde_json::from_value::<InvocationMessage>(value)
                .map(|mut m| {
                    m.message_type = message_type;
                    ServerlessMessage::Invocation(m)
                }),
            OPEN_CONNECTION_MESSAGE_TYPE => serde_json::from_value::<OpenConnectionMessage>(value)
                .map(|mut m| {
                    m.message_type = message_type;
                    ServerlessMessage::OpenConnection(m)
                }),
            CLOSE_CONNECTION_MESSAGE_TYPE => serde_json::from_value::<CloseConnectionMessage>(value)
                .map(|mut m| {
                    m.message_type = message_type;
                    ServerlessMessage::CloseConnection(m)
                }),
            other => {
                tracing::debug!("Ignoring text frame with message type {}", other);
                return None;
            }
        };

        match decoded {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::debug!("Text frame of type {} does not match its schema: {}", message_type, e);
                None
            }
        }
    }

    /// Encode a message as a text frame (JSON followed by the record separator).
    pub fn encode(message: &ServerlessMessage) -> Result<Vec<u8>, serde_json::Error> {
        let mut out = serde_json::to_vec(message)?;
        out.push(RECORD_SEPARATOR);
        Ok(out)
    }

    /// Rename known properties to their camelCase spelling, ignoring case.
    fn canonicalize_keys(object: Map<String, Value>) -> Map<String, Value> {
        object
            .into_iter()
            .map(|(key, value)| {
                let key = KNOWN_PROPERTIES
                    .iter()
                    .find(|known| known.eq_ignore_ascii_case(&key))
                    .map_or(key, |known| known.to_string());
                (key, value)
            })
            .collect()
    }

    fn split_record(buffer: &[u8]) -> &[u8] {
        match buffer.iter().position(|&b| b == RECORD_SEPARATOR) {
            Some(end) => &buffer[..end],
            None => buffer,
        }
    }
}
