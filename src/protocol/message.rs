//! Serverless hub messages.
//!
//! Three message kinds reach the gateway. The `type` discriminants reuse
//! the hub protocol numbering (1 = invocation) and take reserved slots for
//! the connection lifecycle (10 = open, 11 = close).

use serde::{Deserialize, Deserializer, Serialize};

use crate::codec::DynamicValue;

/// Invocation message type.
pub const INVOCATION_MESSAGE_TYPE: i32 = 1;

/// Open connection message type.
pub const OPEN_CONNECTION_MESSAGE_TYPE: i32 = 10;

/// Close connection message type.
pub const CLOSE_CONNECTION_MESSAGE_TYPE: i32 = 11;

/// A client called a hub method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationMessage {
    #[serde(rename = "type", default = "invocation_type")]
    pub message_type: i32,
    /// Present only for blocking invocations. Empty ids are treated as absent.
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub invocation_id: Option<String>,
    pub target: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub arguments: Vec<DynamicValue>,
}

impl InvocationMessage {
    /// Create an invocation of `target` without an invocation id.
    pub fn new(target: impl Into<String>, arguments: Vec<DynamicValue>) -> Self {
        Self {
            message_type: INVOCATION_MESSAGE_TYPE,
            invocation_id: None,
            target: target.into(),
            arguments,
        }
    }

    /// Set the invocation id.
    pub fn with_invocation_id(mut self, id: impl Into<String>) -> Self {
        self.invocation_id = Some(id.into()).filter(|id: &String| !id.is_empty());
        self
    }
}

/// A client connected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenConnectionMessage {
    #[serde(rename = "type", default = "open_type")]
    pub message_type: i32,
}

impl Default for OpenConnectionMessage {
    fn default() -> Self {
        Self {
            message_type: OPEN_CONNECTION_MESSAGE_TYPE,
        }
    }
}

/// A client disconnected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseConnectionMessage {
    #[serde(rename = "type", default = "close_type")]
    pub message_type: i32,
    /// Reason for an abnormal close; `None` on a clean close.
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<String>,
}

impl CloseConnectionMessage {
    /// Create a close message with an optional error.
    pub fn new(error: Option<String>) -> Self {
        Self {
            message_type: CLOSE_CONNECTION_MESSAGE_TYPE,
            error: error.filter(|e| !e.is_empty()),
        }
    }
}

/// A decoded upstream message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerlessMessage {
    Invocation(InvocationMessage),
    OpenConnection(OpenConnectionMessage),
    CloseConnection(CloseConnectionMessage),
}

impl ServerlessMessage {
    /// Wire discriminant.
    pub fn message_type(&self) -> i32 {
        match self {
            ServerlessMessage::Invocation(m) => m.message_type,
            ServerlessMessage::OpenConnection(m) => m.message_type,
            ServerlessMessage::CloseConnection(m) => m.message_type,
        }
    }

    /// Short name for logs and error reasons.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerlessMessage::Invocation(_) => "invocation",
            ServerlessMessage::OpenConnection(_) => "open connection",
            ServerlessMessage::CloseConnection(_) => "close connection",
        }
    }
}

fn invocation_type() -> i32 {
    INVOCATION_MESSAGE_TYPE
}

fn open_type() -> i32 {
    OPEN_CONNECTION_MESSAGE_TYPE
}

fn close_type() -> i32 {
    CLOSE_CONNECTION_MESSAGE_TYPE
}

fn empty_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}

fn null_as_empty<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<DynamicValue>, D::Error> {
    Ok(Option::<Vec<DynamicValue>>::deserialize(deserializer)?.unwrap_or_default())
}
