//! MessagePack binary protocol.
//!
//! Only invocations travel in binary; connection lifecycle messages always
//! arrive as JSON. An invocation frame is a positional array:
//!
//! ```text
//! [ 1, {headers}, invocationId | nil, target, [arguments...] ]
//! ```
//!
//! Headers are read and discarded; they are not exposed to handlers.

use serde::Serialize;

use super::message::{InvocationMessage, ServerlessMessage, INVOCATION_MESSAGE_TYPE};
use crate::codec::{read_value, DecodeLimits, DynamicValue, MsgPackReader};
use crate::error::DecodeError;

/// MessagePack hub protocol decoder.
pub struct MessagePackProtocol;

impl MessagePackProtocol {
    /// Decode one binary frame.
    ///
    /// Returns `Ok(None)` for message types the binary encoding does not
    /// define. Malformed frames are errors.
    pub fn try_decode(
        buffer: &[u8],
        limits: &DecodeLimits,
    ) -> Result<Option<ServerlessMessage>, DecodeError> {
        let mut reader = MsgPackReader::new(buffer);

        // Frame length is implied by the message type.
        reader.read_array_header("frame")?;
        let message_type = reader.read_int32("messageType")?;

        match message_type {
            INVOCATION_MESSAGE_TYPE => {
                Self::read_invocation(&mut reader, limits).map(|m| Some(ServerlessMessage::Invocation(m)))
            }
            other => {
                tracing::debug!("Ignoring binary frame with message type {}", other);
                Ok(None)
            }
        }
    }

    /// Encode an invocation as a binary frame.
    pub fn encode_invocation(message: &InvocationMessage) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        #[derive(Serialize)]
        struct Frame<'a>(
            i32,
            std::collections::BTreeMap<String, String>,
            &'a Option<String>,
            &'a str,
            &'a [DynamicValue],
        );

        rmp_serde::to_vec(&Frame(
            INVOCATION_MESSAGE_TYPE,
            Default::default(),
            &message.invocation_id,
            &message.target,
            &message.arguments,
        ))
    }

    fn read_invocation(
        reader: &mut MsgPackReader<'_>,
        limits: &DecodeLimits,
    ) -> Result<InvocationMessage, DecodeError> {
        Self::skip_headers(reader)?;

        let invocation_id = reader
            .read_optional_string("invocationId")?
            .filter(|id| !id.is_empty());
        let target = reader.read_string("target")?;

        let count = reader.read_array_header("arguments")?;
        let mut arguments = Vec::with_capacity(count);
        for i in 0..count {
            arguments.push(read_value(reader, &format!("arguments[{i}]"), limits)?);
        }

        Ok(InvocationMessage {
            message_type: INVOCATION_MESSAGE_TYPE,
            invocation_id,
            target,
            arguments,
        })
    }

    fn skip_headers(reader: &mut MsgPackReader<'_>) -> Result<(), DecodeError> {
        let count = reader.read_map_header("headers")?;
        for i in 0..count {
            reader.read_string(&format!("headers[{i}].Key"))?;
            reader.read_string(&format!("headers[{i}].Value"))?;
        }
        Ok(())
    }
}
