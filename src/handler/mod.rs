//! Handler module - service handlers and the destination registry.
//!
//! Provides:
//! - [`Handler`] - the capability a service implements
//! - [`RequestContext`] / [`Message`] - opaque request inputs
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use ipc_router::handler::{handler_fn, Handler, Message, RequestContext};
//!
//! struct Lifecycle;
//!
//! impl Handler for Lifecycle {
//!     fn handle(
//!         &self,
//!         _ctx: RequestContext,
//!         _message: Message,
//!     ) -> ipc_router::handler::BoxFuture<'static, ipc_router::handler::HandlerResult> {
//!         Box::pin(async { Ok(Some(Message::from_static(b"RUNNING"))) })
//!     }
//! }
//!
//! let typed: Arc<dyn Handler> = Arc::new(Lifecycle);
//! let closure: Arc<dyn Handler> = Arc::new(handler_fn(|_ctx, msg| async move { Ok(Some(msg)) }));
//! ```

mod context;
mod registry;

pub use context::{Message, RequestContext};
pub(crate) use registry::Registry;
pub use registry::{handler_fn, BoxFuture, FnHandler, Handler, HandlerResult};
