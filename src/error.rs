//! Error types for hubwire.

use http::StatusCode;
use thiserror::Error;

/// A payload could not be decoded.
///
/// The MessagePack encoding carries no field names, so `field` names the
/// logical field that was being read (e.g. `arguments[1].name`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Reading '{field}' failed: {cause}")]
pub struct DecodeError {
    /// Logical field being read.
    pub field: String,
    /// What went wrong.
    pub cause: String,
}

impl DecodeError {
    /// Create a decode error for a field.
    pub fn new(field: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            cause: cause.into(),
        }
    }
}

/// Failure reported by a user handler.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HandlerError {
    /// Create a handler error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create a handler error wrapping an underlying cause.
    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Failure reason shown to the caller.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<DecodeError> for HandlerError {
    fn from(err: DecodeError) -> Self {
        HandlerError::with_source("Argument binding failed", err)
    }
}

/// Main error type for a dispatch.
///
/// Every variant maps to a response status through [`GatewayError::status`];
/// none of them escape the dispatcher.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Content type is missing or not one of the supported media types.
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// A required `X-ASRS-*` header is missing or empty.
    #[error("Missing required context headers")]
    MissingContext,

    /// Category header is neither `connections` nor `messages`.
    #[error("Unsupported category: {0}")]
    InvalidCategory(String),

    /// Signature header is absent or no candidate key matched.
    #[error("Signature validation failed")]
    InvalidSignature,

    /// No handler is registered for this hub.
    #[error("Unknown hub: {0}")]
    UnknownHub(String),

    /// Hub is known but nothing handles this event.
    #[error("No handler for {category} event '{event}'")]
    UnknownEvent {
        /// Category of the request.
        category: String,
        /// Event or target name.
        event: String,
    },

    /// Payload was malformed.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Payload parsed but is not a recognized message.
    #[error("Payload is not a recognized message")]
    NotDecoded,

    /// Decoded message does not match the category/event headers.
    #[error("Category mismatch: {0}")]
    CategoryMismatch(String),

    /// The handler failed.
    #[error("Handler failed: {0}")]
    Handler(#[source] HandlerError),

    /// The host cancelled the dispatch.
    #[error("Dispatch cancelled")]
    Cancelled,
}

impl GatewayError {
    /// Response status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::UnsupportedContentType(_)
            | GatewayError::MissingContext
            | GatewayError::InvalidCategory(_)
            | GatewayError::Decode(_)
            | GatewayError::NotDecoded
            | GatewayError::CategoryMismatch(_) => StatusCode::BAD_REQUEST,
            GatewayError::InvalidSignature => StatusCode::FORBIDDEN,
            GatewayError::UnknownHub(_) | GatewayError::UnknownEvent { .. } => {
                StatusCode::NOT_FOUND
            }
            GatewayError::Handler(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Reason phrase returned to the caller.
    ///
    /// Decode details are not echoed back; handler failures surface the
    /// handler's own message.
    pub fn reason(&self) -> String {
        match self {
            GatewayError::Decode(_) => "Malformed payload".to_string(),
            GatewayError::Handler(e) => e.message().to_string(),
            other => other.to_string(),
        }
    }
}

/// Configuration loading error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML syntax or schema error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias using GatewayError.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::UnsupportedContentType("text/plain".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(GatewayError::InvalidSignature.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            GatewayError::UnknownHub("chat".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::Handler(HandlerError::new("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::from(DecodeError::new("target", "eof")).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_decode_error_names_field() {
        let err = DecodeError::new("arguments[2]", "unexpected marker");
        assert_eq!(
            err.to_string(),
            "Reading 'arguments[2]' failed: unexpected marker"
        );
    }

    #[test]
    fn test_reason_hides_decode_details() {
        let err = GatewayError::from(DecodeError::new("invocationId", "secret detail"));
        assert_eq!(err.reason(), "Malformed payload");
    }

    #[test]
    fn test_handler_reason_surfaced() {
        let err = GatewayError::Handler(HandlerError::new("user not allowed"));
        assert_eq!(err.reason(), "user not allowed");
    }

    #[test]
    fn test_handler_error_keeps_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        let err = HandlerError::with_source("write failed", io);
        assert_eq!(err.message(), "write failed");
        assert!(err.source().is_some());
    }
}
