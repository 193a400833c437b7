//! Protocol module - hub message types and the two wire encodings.
//!
//! - [`JsonProtocol`] - text frames (`application/json`)
//! - [`MessagePackProtocol`] - binary frames (`application/x-msgpack`)
//! - [`HubProtocol`] - picks one of the two from a request content type
//!
//! # Example
//!
//! ```
//! use hubwire::codec::DecodeLimits;
//! use hubwire::protocol::{HubProtocol, ServerlessMessage};
//!
//! let protocol = HubProtocol::from_content_type("application/json; charset=utf-8").unwrap();
//! let message = protocol
//!     .try_decode(b"{\"type\":10}\x1e", &DecodeLimits::default())
//!     .unwrap();
//!
//! assert!(matches!(message, Some(ServerlessMessage::OpenConnection(_))));
//! ```

mod json;
mod message;
mod messagepack;

pub use json::{JsonProtocol, RECORD_SEPARATOR};
pub use message::{
    CloseConnectionMessage, InvocationMessage, OpenConnectionMessage, ServerlessMessage,
    CLOSE_CONNECTION_MESSAGE_TYPE, INVOCATION_MESSAGE_TYPE, OPEN_CONNECTION_MESSAGE_TYPE,
};
pub use messagepack::MessagePackProtocol;

use crate::codec::DecodeLimits;
use crate::error::DecodeError;

/// Media type of JSON text frames.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Media type of MessagePack binary frames.
pub const MESSAGEPACK_CONTENT_TYPE: &str = "application/x-msgpack";

/// Wire encoding of an upstream request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubProtocol {
    /// JSON text frames.
    Json,
    /// MessagePack binary frames.
    MessagePack,
}

impl HubProtocol {
    /// Select the protocol for a `content-type` value.
    ///
    /// Parameters such as `charset` are ignored; the media type itself is
    /// compared case-insensitively.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let media_type = content_type.split(';').next().unwrap_or_default().trim();

        if media_type.eq_ignore_ascii_case(JSON_CONTENT_TYPE) {
            Some(HubProtocol::Json)
        } else if media_type.eq_ignore_ascii_case(MESSAGEPACK_CONTENT_TYPE) {
            Some(HubProtocol::MessagePack)
        } else {
            None
        }
    }

    /// Media type for this protocol.
    pub fn content_type(&self) -> &'static str {
        match self {
            HubProtocol::Json => JSON_CONTENT_TYPE,
            HubProtocol::MessagePack => MESSAGEPACK_CONTENT_TYPE,
        }
    }

    /// Decode a request body.
    ///
    /// `Ok(None)` means the body was well-formed enough to inspect but is
    /// not a message this gateway understands.
    pub fn try_decode(
        &self,
        buffer: &[u8],
        limits: &DecodeLimits,
    ) -> Result<Option<ServerlessMessage>, DecodeError> {
        match self {
            HubProtocol::Json => Ok(JsonProtocol::try_decode(buffer)),
            HubProtocol::MessagePack => MessagePackProtocol::try_decode(buffer, limits),
        }
    }
}
