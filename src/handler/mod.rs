//! Handler module - invocation contexts and event routing.
//!
//! Provides:
//! - [`InvocationContext`] - what a handler knows about its request
//! - [`HandlerRegistry`] - maps (hub, category, event) to handlers
//!
//! # Example
//!
//! ```ignore
//! use hubwire::handler::{Category, HandlerRegistry};
//!
//! let registry = HandlerRegistry::new();
//!
//! // Whole-context handler
//! registry.register_fn("chat", Category::Connections, "connected", |ctx| async move {
//!     tracing::info!("{} joined", ctx.connection_id());
//!     Ok(())
//! });
//!
//! // Arguments bound to a tuple
//! registry.register_typed("chat", "broadcast", |(text,): (String,), _ctx| async move {
//!     tracing::info!("{}", text);
//!     Ok(())
//! });
//! ```

mod context;
mod registry;

pub use context::{Category, InvocationContext, CONNECTED_EVENT, DISCONNECTED_EVENT};
pub use registry::{
    BoxFuture, FnHandler, Handler, HandlerRegistry, HandlerResult, TypedHandler,
};
