//! Dispatcher builder and request routing.
//!
//! The [`DispatcherBuilder`] provides a fluent API for registering handlers
//! and access keys. The [`Dispatcher`] runs every upstream request through
//! the same pipeline:
//! 1. Check the content type
//! 2. Validate the signature against the candidate keys
//! 3. Extract the invocation context from the headers
//! 4. Check the hub is known
//! 5. Decode the body and bind it to the context
//! 6. Look up and run the handler
//!
//! Each step that fails ends the request with its status; nothing past the
//! failing step runs.
//!
//! # Example
//!
//! ```ignore
//! use hubwire::Dispatcher;
//!
//! let dispatcher = Dispatcher::builder()
//!     .access_keys(vec!["secret".into()])
//!     .on_connected("chat", |ctx| async move {
//!         tracing::info!("{} connected", ctx.connection_id());
//!         Ok(())
//!     })
//!     .on_message_typed("chat", "broadcast", |(text,): (String,), _ctx| async move {
//!         tracing::info!("broadcast: {}", text);
//!         Ok(())
//!     })
//!     .build();
//!
//! let response = dispatcher.dispatch(request).await;
//! let http_response: http::Response<bytes::Bytes> = response.into();
//! ```

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Request, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::codec::DecodeLimits;
use crate::config::{AccessKeyProvider, GatewayConfig};
use crate::error::{GatewayError, Result};
use crate::handler::{
    Category, Handler, HandlerRegistry, HandlerResult, InvocationContext, CONNECTED_EVENT,
    DISCONNECTED_EVENT,
};
use crate::request::{extract_context, request_protocol, validate_signature};

/// Outcome of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    status: StatusCode,
    reason: Option<String>,
}

impl GatewayResponse {
    /// Successful response without a body.
    pub fn ok() -> Self {
        Self {
            status: StatusCode::OK,
            reason: None,
        }
    }

    /// Response describing a failed dispatch.
    pub fn from_error(err: &GatewayError) -> Self {
        Self {
            status: err.status(),
            reason: Some(err.reason()),
        }
    }

    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Convert into an HTTP response; the reason becomes a `text/plain` body.
    pub fn into_http(self) -> Response<Bytes> {
        let mut response = Response::new(Bytes::new());
        *response.status_mut() = self.status;

        if let Some(reason) = self.reason {
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            );
            *response.body_mut() = Bytes::from(reason);
        }

        response
    }
}

impl From<GatewayResponse> for Response<Bytes> {
    fn from(response: GatewayResponse) -> Self {
        response.into_http()
    }
}

/// Builder for configuring and creating a [`Dispatcher`].
pub struct DispatcherBuilder {
    registry: HandlerRegistry,
    keys: Option<Arc<dyn AccessKeyProvider>>,
    limits: DecodeLimits,
}

impl DispatcherBuilder {
    /// Create a new dispatcher builder.
    pub fn new() -> Self {
        Self {
            registry: HandlerRegistry::new(),
            keys: None,
            limits: DecodeLimits::default(),
        }
    }

    /// Use a fixed list of access keys.
    pub fn access_keys(self, keys: Vec<String>) -> Self {
        self.key_provider(keys)
    }

    /// Use a key provider queried on every request.
    pub fn key_provider(mut self, provider: impl AccessKeyProvider) -> Self {
        self.keys = Some(Arc::new(provider));
        self
    }

    /// Take access keys and decode limits from a configuration.
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.limits = config.decode_limits();
        self.key_provider(config)
    }

    /// Set the decode limits for binary payloads.
    pub fn limits(mut self, limits: DecodeLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Register any [`Handler`] for a route.
    pub fn handler(
        self,
        hub: &str,
        category: Category,
        event: &str,
        handler: impl Handler,
    ) -> Self {
        self.registry.register(hub, category, event, handler);
        self
    }

    /// Handle the `connected` event of `hub`.
    pub fn on_connected<F, Fut>(self, hub: &str, handler: F) -> Self
    where
        F: Fn(InvocationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry
            .register_fn(hub, Category::Connections, CONNECTED_EVENT, handler);
        self
    }

    /// Handle the `disconnected` event of `hub`.
    pub fn on_disconnected<F, Fut>(self, hub: &str, handler: F) -> Self
    where
        F: Fn(InvocationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry
            .register_fn(hub, Category::Connections, DISCONNECTED_EVENT, handler);
        self
    }

    /// Handle invocations of hub method `event`.
    pub fn on_message<F, Fut>(self, hub: &str, event: &str, handler: F) -> Self
    where
        F: Fn(InvocationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry
            .register_fn(hub, Category::Messages, event, handler);
        self
    }

    /// Handle invocations of `event` with arguments bound to `T`.
    pub fn on_message_typed<F, T, Fut>(self, hub: &str, event: &str, handler: F) -> Self
    where
        F: Fn(T, InvocationContext) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.register_typed(hub, event, handler);
        self
    }

    /// Build the dispatcher.
    ///
    /// Without keys every request fails signature validation.
    pub fn build(self) -> Dispatcher {
        let keys = self.keys.unwrap_or_else(|| {
            tracing::warn!("Dispatcher built without access keys; all requests will be rejected");
            Arc::new(Vec::<String>::new())
        });

        Dispatcher {
            registry: Arc::new(self.registry),
            keys,
            limits: self.limits,
        }
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes upstream requests to registered handlers.
///
/// Cheap to clone; clones share the registry and key provider.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    keys: Arc<dyn AccessKeyProvider>,
    limits: DecodeLimits,
}

impl Dispatcher {
    /// Create a new dispatcher builder.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Registry shared with this dispatcher; handlers added here are
    /// visible to the next request.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Decode limits applied to binary payloads.
    pub fn limits(&self) -> DecodeLimits {
        self.limits
    }

    /// Process one upstream request.
    pub async fn dispatch(&self, request: Request<Bytes>) -> GatewayResponse {
        let outcome = match self.prepare(&request) {
            Ok(ctx) => self.registry.dispatch(ctx).await,
            Err(e) => Err(e),
        };
        Self::respond(outcome)
    }

    /// Process one upstream request, abandoning the handler if `cancel`
    /// completes first.
    ///
    /// A cancelled dispatch answers `503 Service Unavailable`.
    pub async fn dispatch_with_cancel<C>(&self, request: Request<Bytes>, cancel: C) -> GatewayResponse
    where
        C: Future<Output = ()>,
    {
        let outcome = match self.prepare(&request) {
            Ok(ctx) => {
                let connection_id = ctx.connection_id().to_string();
                tokio::select! {
                    result = self.registry.dispatch(ctx) => result,
                    _ = cancel => {
                        tracing::debug!("Dispatch for connection {} cancelled", connection_id);
                        Err(GatewayError::Cancelled)
                    }
                }
            }
            Err(e) => Err(e),
        };
        Self::respond(outcome)
    }

    /// Validate the request and build the handler's context.
    fn prepare(&self, request: &Request<Bytes>) -> Result<InvocationContext> {
        let protocol = request_protocol(request).ok_or_else(|| {
            GatewayError::UnsupportedContentType(
                request
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("<none>")
                    .to_string(),
            )
        })?;

        if !validate_signature(request, &self.keys.candidate_keys()) {
            return Err(GatewayError::InvalidSignature);
        }

        let ctx = extract_context(request)?;

        if !self.registry.contains_hub(ctx.hub()) {
            return Err(GatewayError::UnknownHub(ctx.hub().to_string()));
        }

        let message = protocol
            .try_decode(request.body(), &self.limits)?
            .ok_or(GatewayError::NotDecoded)?;

        tracing::debug!(
            "Routing {} message for {}/{}/{} (connection {})",
            message.kind(),
            ctx.hub(),
            ctx.category(),
            ctx.event(),
            ctx.connection_id()
        );

        ctx.bind_message(message)
    }

    fn respond(outcome: Result<()>) -> GatewayResponse {
        match outcome {
            Ok(()) => GatewayResponse::ok(),
            Err(e) => {
                match &e {
                    GatewayError::Handler(_) => tracing::error!("{}", e),
                    GatewayError::Cancelled => {}
                    _ => tracing::warn!("Rejected upstream request: {}", e),
                }
                GatewayResponse::from_error(&e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_method_chaining() {
        let dispatcher = Dispatcher::builder()
            .access_keys(vec!["k".into()])
            .on_connected("chat", |_ctx| async { Ok(()) })
            .on_disconnected("chat", |_ctx| async { Ok(()) })
            .on_message("chat", "send", |_ctx| async { Ok(()) })
            .on_message_typed("chat", "typed", |_: (String,), _ctx| async { Ok(()) })
            .build();

        let registry: &HandlerRegistry = dispatcher.registry();
        assert_eq!(registry.len(), 4);
        assert!(registry
            .get_handler("chat", Category::Connections, "connected")
            .is_some());
        assert!(registry
            .get_handler("chat", Category::Connections, "disconnected")
            .is_some());
    }

    #[test]
    fn test_config_sets_limits() {
        let config = GatewayConfig {
            access_keys: vec!["k".into()],
            max_nesting_depth: 3,
        };
        let dispatcher = Dispatcher::builder().config(config).build();
        assert_eq!(dispatcher.limits().max_depth, 3);
    }

    #[test]
    fn test_response_into_http() {
        let ok: Response<Bytes> = GatewayResponse::ok().into();
        assert_eq!(ok.status(), StatusCode::OK);
        assert!(ok.body().is_empty());

        let failed = GatewayResponse::from_error(&GatewayError::UnknownHub("chat".into()));
        assert_eq!(failed.reason(), Some("Unknown hub: chat"));

        let http = failed.into_http();
        assert_eq!(http.status(), StatusCode::NOT_FOUND);
        assert_eq!(http.body(), &Bytes::from("Unknown hub: chat"));
        assert_eq!(
            http.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn test_unsupported_content_type() {
        let dispatcher = Dispatcher::builder().access_keys(vec!["k".into()]).build();
        let request = Request::post("/")
            .header(CONTENT_TYPE, "text/plain")
            .body(Bytes::new())
            .unwrap();

        let response = dispatcher.dispatch(request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.reason(), Some("Unsupported content type: text/plain"));
    }

    #[tokio::test]
    async fn test_no_keys_rejects() {
        let dispatcher = Dispatcher::builder().build();
        let request = Request::post("/")
            .header(CONTENT_TYPE, "application/json")
            .body(Bytes::new())
            .unwrap();

        let response = dispatcher.dispatch(request).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
