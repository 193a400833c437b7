//! Handler registry for routing invocations by hub, category and event.
//!
//! Names are matched case-insensitively. Registering the same route twice
//! replaces the earlier handler. The registry is shared with the dispatcher
//! behind an `Arc`, so handlers may be added while requests are in flight.
//!
//! # Example
//!
//! ```ignore
//! use hubwire::handler::{Category, HandlerRegistry};
//!
//! let registry = HandlerRegistry::new();
//!
//! registry.register_fn("chat", Category::Messages, "broadcast", |ctx| async move {
//!     tracing::info!("{:?}", ctx.arguments());
//!     Ok(())
//! });
//!
//! registry.register_typed("chat", "send", |(to, text): (String, String), _ctx| async move {
//!     tracing::info!("{} <- {}", to, text);
//!     Ok(())
//! });
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;

use super::context::{Category, InvocationContext};
use crate::error::{GatewayError, HandlerError, Result};

/// Result type for handler functions.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for event handlers.
pub trait Handler: Send + Sync + 'static {
    /// Handle one event.
    fn call(&self, ctx: InvocationContext) -> BoxFuture<'static, HandlerResult>;
}

/// Handler built from an async closure over the whole context.
pub struct FnHandler<F, Fut>
where
    F: Fn(InvocationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(InvocationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Handler for FnHandler<F, Fut>
where
    F: Fn(InvocationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: InvocationContext) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.handler)(ctx))
    }
}

/// Wrapper that binds the invocation arguments before calling the handler.
///
/// `T` is typically a tuple with one element per argument.
pub struct TypedHandler<F, T, Fut>
where
    F: Fn(T, InvocationContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> Fut>,
}

impl<F, T, Fut> TypedHandler<F, T, Fut>
where
    F: Fn(T, InvocationContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, Fut> Handler for TypedHandler<F, T, Fut>
where
    F: Fn(T, InvocationContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: InvocationContext) -> BoxFuture<'static, HandlerResult> {
        let parsed: T = match ctx.arguments_as() {
            Ok(v) => v,
            Err(e) => return Box::pin(async move { Err(HandlerError::from(e)) }),
        };

        Box::pin((self.handler)(parsed, ctx))
    }
}

/// Routes registered under one hub.
#[derive(Default)]
struct HubRoutes {
    handlers: HashMap<(Category, String), Arc<dyn Handler>>,
}

/// Registry mapping (hub, category, event) to handlers.
pub struct HandlerRegistry {
    /// Routes by folded hub name.
    hubs: RwLock<HashMap<String, HubRoutes>>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            hubs: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler, replacing any previous one for the same route.
    pub fn register<H: Handler>(&self, hub: &str, category: Category, event: &str, handler: H) {
        self.register_arc(hub, category, event, Arc::new(handler));
    }

    /// Register an already shared handler.
    pub fn register_arc(
        &self,
        hub: &str,
        category: Category,
        event: &str,
        handler: Arc<dyn Handler>,
    ) {
        let mut hubs = self.hubs.write().unwrap_or_else(PoisonError::into_inner);
        let replaced = hubs
            .entry(fold(hub))
            .or_default()
            .handlers
            .insert((category, fold(event)), handler)
            .is_some();

        if replaced {
            tracing::debug!("Replaced handler for {}/{}/{}", hub, category, event);
        } else {
            tracing::debug!("Registered handler for {}/{}/{}", hub, category, event);
        }
    }

    /// Register an async closure receiving the whole context.
    pub fn register_fn<F, Fut>(&self, hub: &str, category: Category, event: &str, handler: F)
    where
        F: Fn(InvocationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(hub, category, event, FnHandler::new(handler));
    }

    /// Register a `messages` handler whose arguments are bound to `T`.
    pub fn register_typed<F, T, Fut>(&self, hub: &str, event: &str, handler: F)
    where
        F: Fn(T, InvocationContext) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(hub, Category::Messages, event, TypedHandler::new(handler));
    }

    /// Whether any handler is registered under `hub`.
    pub fn contains_hub(&self, hub: &str) -> bool {
        self.hubs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&fold(hub))
    }

    /// Get the handler for a route.
    pub fn get_handler(&self, hub: &str, category: Category, event: &str) -> Option<Arc<dyn Handler>> {
        self.hubs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&fold(hub))
            .and_then(|routes| routes.handlers.get(&(category, fold(event))))
            .cloned()
    }

    /// Number of registered routes across all hubs.
    pub fn len(&self) -> usize {
        self.hubs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|routes| routes.handlers.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke the handler registered for the context's route.
    ///
    /// The registry lock is released before the handler runs.
    pub async fn dispatch(&self, ctx: InvocationContext) -> Result<()> {
        let handler = self
            .get_handler(ctx.hub(), ctx.category(), ctx.event())
            .ok_or_else(|| GatewayError::UnknownEvent {
                category: ctx.category().to_string(),
                event: ctx.event().to_string(),
            })?;

        handler.call(ctx).await.map_err(GatewayError::Handler)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn fold(name: &str) -> String {
    name.to_lowercase()
}
