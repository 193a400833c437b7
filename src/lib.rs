//! # hubwire
//!
//! Event gateway for serverless real-time messaging hubs.
//!
//! The hub service turns client activity (connect, disconnect, hub method
//! invocations) into signed HTTP calls. This crate validates those calls,
//! decodes their JSON or MessagePack payloads and routes them to handlers
//! registered per hub, category and event.
//!
//! ## Architecture
//!
//! - **Codec**: MessagePack primitive reader and dynamic argument values
//! - **Protocol**: hub messages and their text/binary encodings
//! - **Request**: signature check and `X-ASRS-*` header extraction
//! - **Dispatcher**: routing pipeline producing one status per request
//!
//! Serving HTTP is left to the host; the dispatcher consumes
//! `http::Request<Bytes>` and produces a response convertible into
//! `http::Response<Bytes>`.
//!
//! ## Example
//!
//! ```ignore
//! use hubwire::{Dispatcher, GatewayConfig};
//!
//! let config = GatewayConfig::load_with_env("hubwire.toml".as_ref())?;
//!
//! let dispatcher = Dispatcher::builder()
//!     .config(config)
//!     .on_message("chat", "broadcast", |ctx| async move {
//!         tracing::info!("{:?}", ctx.arguments());
//!         Ok(())
//!     })
//!     .build();
//!
//! // inside the host's HTTP handler
//! let response: http::Response<bytes::Bytes> = dispatcher.dispatch(request).await.into();
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod request;

mod dispatcher;

pub use config::{AccessKeyProvider, GatewayConfig, RotatingKeys};
pub use dispatcher::{Dispatcher, DispatcherBuilder, GatewayResponse};
pub use error::{DecodeError, GatewayError, HandlerError};
pub use handler::{Category, HandlerResult, InvocationContext};
