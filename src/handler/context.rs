//! Invocation context passed to handlers.
//!
//! One context is built per upstream request from its `X-ASRS-*` headers,
//! then completed with the fields of the decoded message: arguments and
//! invocation id for invocations, the error for a close.
//!
//! # Example
//!
//! ```ignore
//! async fn on_message(ctx: InvocationContext) -> HandlerResult {
//!     let text: String = ctx.argument(0)?;
//!     tracing::info!(connection = ctx.connection_id(), "{}", text);
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};

use crate::codec::DynamicValue;
use crate::error::{DecodeError, GatewayError};
use crate::protocol::ServerlessMessage;

/// Event name of a client connecting.
pub const CONNECTED_EVENT: &str = "connected";

/// Event name of a client disconnecting.
pub const DISCONNECTED_EVENT: &str = "disconnected";

/// Coarse event classification carried in `X-ASRS-Category`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Connection lifecycle (`connected`, `disconnected`).
    Connections,
    /// Hub method invocations.
    Messages,
}

impl Category {
    /// Parse a category header value, ignoring case.
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("connections") {
            Some(Category::Connections)
        } else if value.eq_ignore_ascii_case("messages") {
            Some(Category::Messages)
        } else {
            None
        }
    }

    /// Canonical header value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Connections => "connections",
            Category::Messages => "messages",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a handler knows about the request that triggered it.
///
/// Serializes to the camelCase JSON shape handlers commonly forward
/// elsewhere; binary arguments appear as base64 strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationContext {
    connection_id: String,
    hub: String,
    category: Category,
    event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    claims: Option<BTreeMap<String, String>>,
    headers: BTreeMap<String, String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "arguments_as_json"
    )]
    arguments: Option<Vec<DynamicValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    invocation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl InvocationContext {
    /// Create a context from the four required fields.
    pub fn new(
        connection_id: impl Into<String>,
        hub: impl Into<String>,
        category: Category,
        event: impl Into<String>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            hub: hub.into(),
            category,
            event: event.into(),
            user_id: None,
            query: None,
            claims: None,
            headers: BTreeMap::new(),
            arguments: None,
            invocation_id: None,
            error: None,
        }
    }

    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_query(mut self, query: Option<BTreeMap<String, String>>) -> Self {
        self.query = query;
        self
    }

    pub fn with_claims(mut self, claims: Option<BTreeMap<String, String>>) -> Self {
        self.claims = claims;
        self
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    #[inline]
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    #[inline]
    pub fn hub(&self) -> &str {
        &self.hub
    }

    #[inline]
    pub fn category(&self) -> Category {
        self.category
    }

    #[inline]
    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn query(&self) -> Option<&BTreeMap<String, String>> {
        self.query.as_ref()
    }

    pub fn claims(&self) -> Option<&BTreeMap<String, String>> {
        self.claims.as_ref()
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Decoded arguments; `None` unless this is an invocation.
    pub fn arguments(&self) -> Option<&[DynamicValue]> {
        self.arguments.as_deref()
    }

    /// Invocation id of a blocking invocation.
    ///
    /// The gateway answers only with a status; no completion message is
    /// sent back for this id.
    pub fn invocation_id(&self) -> Option<&str> {
        self.invocation_id.as_deref()
    }

    /// Close reason; `None` on a clean close or for other events.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Bind the argument at `index` to a typed value.
    pub fn argument<T: DeserializeOwned>(&self, index: usize) -> Result<T, DecodeError> {
        let field = format!("arguments[{index}]");
        let value = self
            .arguments
            .as_ref()
            .and_then(|args| args.get(index))
            .ok_or_else(|| DecodeError::new(&field, "argument not present"))?;

        value
            .deserialize_into()
            .map_err(|e| DecodeError::new(field, e.to_string()))
    }

    /// Bind the whole argument list, typically to a tuple.
    pub fn arguments_as<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        let values = self.arguments.as_deref().unwrap_or_default();
        let json = serde_json::Value::Array(values.iter().map(DynamicValue::to_json).collect());
        serde_json::from_value(json).map_err(|e| DecodeError::new("arguments", e.to_string()))
    }

    /// JSON form of this context.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Complete the context with a decoded message.
    ///
    /// Fails when the message kind does not agree with the category and
    /// event headers the context was built from.
    pub(crate) fn bind_message(mut self, message: ServerlessMessage) -> Result<Self, GatewayError> {
        match (self.category, message) {
            (Category::Messages, ServerlessMessage::Invocation(m)) => {
                if !same_name(&m.target, &self.event) {
                    return Err(GatewayError::CategoryMismatch(format!(
                        "target '{}' does not match event '{}'",
                        m.target, self.event
                    )));
                }
                self.invocation_id = m.invocation_id;
                self.arguments = Some(m.arguments);
                Ok(self)
            }
            (Category::Connections, ServerlessMessage::OpenConnection(_))
                if !same_name(&self.event, DISCONNECTED_EVENT) =>
            {
                Ok(self)
            }
            (Category::Connections, ServerlessMessage::CloseConnection(m))
                if !same_name(&self.event, CONNECTED_EVENT) =>
            {
                self.error = m.error;
                Ok(self)
            }
            (category, message) => Err(GatewayError::CategoryMismatch(format!(
                "{} event '{}' cannot carry a {} message",
                category,
                self.event,
                message.kind()
            ))),
        }
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

fn arguments_as_json<S: Serializer>(
    arguments: &Option<Vec<DynamicValue>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    arguments
        .as_ref()
        .map(|args| args.iter().map(DynamicValue::to_json).collect::<Vec<_>>())
        .serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CloseConnectionMessage, InvocationMessage, OpenConnectionMessage};
    use serde_json::json;

    fn invocation(target: &str, args: Vec<DynamicValue>) -> ServerlessMessage {
        ServerlessMessage::Invocation(InvocationMessage::new(target, args).with_invocation_id("9"))
    }

    #[test]
    fn test_category_parse() {
        assert_eq!(Category::parse("connections"), Some(Category::Connections));
        assert_eq!(Category::parse("Messages"), Some(Category::Messages));
        assert_eq!(Category::parse("events"), None);
        assert_eq!(Category::Messages.to_string(), "messages");
    }

    #[test]
    fn test_bind_invocation() {
        let ctx = InvocationContext::new("c1", "chat", Category::Messages, "Broadcast")
            .bind_message(invocation("broadcast", vec![DynamicValue::Integer(1)]))
            .unwrap();

        assert_eq!(ctx.arguments(), Some(&[DynamicValue::Integer(1)][..]));
        assert_eq!(ctx.invocation_id(), Some("9"));
        assert_eq!(ctx.error(), None);
    }

    #[test]
    fn test_bind_target_mismatch() {
        let err = InvocationContext::new("c1", "chat", Category::Messages, "broadcast")
            .bind_message(invocation("echo", vec![]))
            .unwrap_err();
        assert!(matches!(err, GatewayError::CategoryMismatch(_)));
    }

    #[test]
    fn test_bind_close_under_messages_fails() {
        let err = InvocationContext::new("c1", "chat", Category::Messages, "broadcast")
            .bind_message(ServerlessMessage::CloseConnection(CloseConnectionMessage::new(None)))
            .unwrap_err();
        assert!(matches!(err, GatewayError::CategoryMismatch(_)));
    }

    #[test]
    fn test_bind_connection_events() {
        let open = InvocationContext::new("c1", "chat", Category::Connections, "connected")
            .bind_message(ServerlessMessage::OpenConnection(OpenConnectionMessage::default()));
        assert!(open.is_ok());

        let close = InvocationContext::new("c1", "chat", Category::Connections, "disconnected")
            .bind_message(ServerlessMessage::CloseConnection(CloseConnectionMessage::new(Some(
                "timeout".into(),
            ))))
            .unwrap();
        assert_eq!(close.error(), Some("timeout"));
        assert_eq!(close.arguments(), None);
    }

    #[test]
    fn test_bind_swapped_connection_events_fail() {
        let err = InvocationContext::new("c1", "chat", Category::Connections, "connected")
            .bind_message(ServerlessMessage::CloseConnection(CloseConnectionMessage::new(None)))
            .unwrap_err();
        assert!(matches!(err, GatewayError::CategoryMismatch(_)));

        let err = InvocationContext::new("c1", "chat", Category::Connections, "disconnected")
            .bind_message(ServerlessMessage::OpenConnection(OpenConnectionMessage::default()))
            .unwrap_err();
        assert!(matches!(err, GatewayError::CategoryMismatch(_)));
    }

    #[test]
    fn test_bind_invocation_under_connections_fails() {
        let err = InvocationContext::new("c1", "chat", Category::Connections, "connected")
            .bind_message(invocation("connected", vec![]))
            .unwrap_err();
        assert!(matches!(err, GatewayError::CategoryMismatch(_)));
    }

    #[test]
    fn test_typed_arguments() {
        let ctx = InvocationContext::new("c1", "chat", Category::Messages, "send")
            .bind_message(invocation(
                "send",
                vec![DynamicValue::String("ann".into()), DynamicValue::Integer(3)],
            ))
            .unwrap();

        let name: String = ctx.argument(0).unwrap();
        assert_eq!(name, "ann");

        let (name, count): (String, u8) = ctx.arguments_as().unwrap();
        assert_eq!((name.as_str(), count), ("ann", 3));

        let err = ctx.argument::<String>(5).unwrap_err();
        assert_eq!(err.field, "arguments[5]");

        let err = ctx.argument::<bool>(1).unwrap_err();
        assert_eq!(err.field, "arguments[1]");
    }

    #[test]
    fn test_to_json() {
        let ctx = InvocationContext::new("c1", "chat", Category::Messages, "send")
            .with_user_id(Some("u1".into()))
            .with_headers(BTreeMap::from([("x-test".to_string(), "1".to_string())]))
            .bind_message(invocation("send", vec![DynamicValue::Bytes(vec![1])]))
            .unwrap();

        assert_eq!(
            ctx.to_json(),
            json!({
                "connectionId": "c1",
                "hub": "chat",
                "category": "messages",
                "event": "send",
                "userId": "u1",
                "headers": {"x-test": "1"},
                "arguments": ["AQ=="],
                "invocationId": "9"
            })
        );
    }
}
