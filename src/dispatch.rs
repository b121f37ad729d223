//! Dispatcher task between the transport and the router.
//!
//! The transport decodes frames into [`InboundRequest`]s and hands them to
//! a [`RequestSender`]. A single loop task receives them and spawns one task
//! per request, so a slow handler never delays the next request.
//!
//! # Architecture
//!
//! ```text
//! Connection 1 ─┐
//! Connection 2 ─┼─► mpsc::Sender<InboundRequest> ─► Dispatcher ─► task per request
//! Connection N ─┘                                                    │
//!                    oneshot::Receiver<HandlerResult> ◄──────────────┘
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Result, RouterError};
use crate::handler::{HandlerResult, Message, RequestContext};
use crate::router::Router;

/// A request resolved by destination, ready for dispatch.
#[derive(Debug)]
pub struct InboundRequest {
    /// Target destination name.
    pub destination: String,
    /// Caller context, passed through untouched.
    pub context: RequestContext,
    /// Request payload, passed through untouched.
    pub message: Message,
    /// Where the handler's outcome goes.
    reply: oneshot::Sender<HandlerResult>,
}

impl InboundRequest {
    /// Create a request and the receiver its outcome will arrive on.
    pub fn new(
        destination: impl Into<String>,
        context: RequestContext,
        message: Message,
    ) -> (Self, oneshot::Receiver<HandlerResult>) {
        let (reply, rx) = oneshot::channel();
        let request = Self {
            destination: destination.into(),
            context,
            message,
            reply,
        };
        (request, rx)
    }
}

/// Handle for submitting requests to a running dispatcher.
///
/// Cheap to clone; the dispatcher stops once every handle is dropped.
#[derive(Clone)]
pub struct RequestSender {
    tx: mpsc::Sender<InboundRequest>,
}

impl RequestSender {
    /// Submit a prepared request.
    ///
    /// Waits for queue space when the dispatcher is behind.
    pub async fn send(&self, request: InboundRequest) -> Result<()> {
        self.tx
            .send(request)
            .await
            .map_err(|_| RouterError::DispatcherStopped)
    }

    /// Submit a request and wait for the handler's response.
    pub async fn call(
        &self,
        destination: impl Into<String>,
        context: RequestContext,
        message: Message,
    ) -> HandlerResult {
        let (request, rx) = InboundRequest::new(destination, context, message);
        self.send(request).await?;
        rx.await.map_err(|_| RouterError::DispatcherStopped)?
    }

    /// Whether the dispatcher loop has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn a dispatcher loop for `router`.
///
/// Returns the submission handle and the loop's join handle.
pub fn spawn_dispatcher(
    router: Arc<Router>,
    capacity: usize,
) -> (RequestSender, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(dispatch_loop(router, rx));
    (RequestSender { tx }, task)
}

/// Main loop - receives requests and runs each on its own task.
async fn dispatch_loop(router: Arc<Router>, mut rx: mpsc::Receiver<InboundRequest>) {
    while let Some(request) = rx.recv().await {
        let InboundRequest {
            destination,
            context,
            message,
            reply,
        } = request;

        let router = router.clone();
        tokio::spawn(async move {
            // Inner task isolates handler panics from the reply path
            let target = destination.clone();
            let run = tokio::spawn(async move {
                router.dispatch(&target, context, message).await
            });

            let outcome = match run.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => {
                    tracing::error!("Handler for destination {} panicked", destination);
                    Err(RouterError::service(destination.as_str(), "handler panicked"))
                }
                Err(_) => Err(RouterError::DispatcherStopped),
            };

            if reply.send(outcome).is_err() {
                tracing::debug!("Requester for destination {} went away", destination);
            }
        });
    }

    tracing::debug!("Dispatcher stopped: all senders dropped");
}
