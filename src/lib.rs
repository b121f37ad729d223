//! # ipc-router
//!
//! In-process destination router for an IPC server.
//!
//! The transport decodes inbound frames into requests addressed to a named
//! destination. The [`Router`] resolves each destination to the one handler
//! registered for it and runs that handler with the caller's context and
//! message, untouched.
//!
//! ## Guarantees
//!
//! - **One handler per destination**: a second registration fails with
//!   [`RouterError::DuplicateRegistration`] and the first handler stays.
//! - **Concurrent use**: registration, lookup and dispatch may be called
//!   from any number of tasks or threads; the registry lock is never held
//!   while a handler runs.
//! - **Lifecycle**: after [`Router::shutdown`] every operation fails with
//!   [`RouterError::RouterClosed`]; running dispatches are drained.
//!
//! ## Example
//!
//! ```
//! use ipc_router::handler::{Message, RequestContext};
//! use ipc_router::{Router, RouterError};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> ipc_router::Result<()> {
//! let router = Router::new();
//! router.register_fn("lifecycle", |_ctx, _msg| async {
//!     Ok(Some(Message::from_static(b"RUNNING")))
//! })?;
//!
//! let duplicate = router.register_fn("lifecycle", |_ctx, _msg| async { Ok(None) });
//! assert!(matches!(duplicate, Err(RouterError::DuplicateRegistration(_))));
//!
//! let handler = router.get_callback_for_destination("lifecycle")?;
//! let reply = handler.handle(RequestContext::default(), Message::empty()).await?;
//! assert_eq!(reply, Some(Message::from_static(b"RUNNING")));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod logging;

mod destination;
mod router;

pub use config::RouterConfig;
pub use destination::Destination;
pub use error::{Result, RouterError};
pub use handler::{Handler, Message, RequestContext};
pub use router::{Router, RouterBuilder};
