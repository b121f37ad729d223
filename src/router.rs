//! Router builder and runtime.
//!
//! The [`Router`] owns the destination registry and its lifecycle:
//! 1. Services register one handler per destination
//! 2. The transport resolves each inbound request by destination
//! 3. The resolved handler runs outside any router lock
//! 4. `shutdown()` rejects new work and waits for in-flight dispatches
//!
//! # Example
//!
//! ```
//! use ipc_router::handler::{Message, RequestContext};
//! use ipc_router::Router;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> ipc_router::Result<()> {
//! let router = Router::builder()
//!     .handle("echo", |_ctx, msg| async move { Ok(Some(msg)) })
//!     .max_concurrent_dispatches(64)
//!     .build()?;
//!
//! let reply = router
//!     .dispatch("echo", RequestContext::new(1), Message::from_static(b"hi"))
//!     .await?;
//! assert_eq!(reply, Some(Message::from_static(b"hi")));
//!
//! router.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Notify, Semaphore, TryAcquireError};

use crate::config::RouterConfig;
use crate::destination::Destination;
use crate::error::{Result, RouterError};
use crate::handler::{handler_fn, Handler, HandlerResult, Message, Registry, RequestContext};

/// Builder for configuring and creating a [`Router`].
///
/// Use the fluent API to register handlers, then call `build()`.
pub struct RouterBuilder {
    services: Vec<(String, Arc<dyn Handler>)>,
    config: RouterConfig,
}

impl RouterBuilder {
    /// Create a new router builder.
    pub fn new() -> Self {
        Self {
            services: Vec::new(),
            config: RouterConfig::default(),
        }
    }

    /// Register an async closure for `destination`.
    pub fn handle<F, Fut>(self, destination: &str, handler: F) -> Self
    where
        F: Fn(RequestContext, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.service(destination, Arc::new(handler_fn(handler)))
    }

    /// Register an existing handler for `destination`.
    pub fn service(mut self, destination: &str, handler: Arc<dyn Handler>) -> Self {
        self.services.push((destination.to_string(), handler));
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the maximum number of concurrent dispatches.
    ///
    /// When this limit is reached, `dispatch` fails with `Saturated`.
    /// Default: 256
    pub fn max_concurrent_dispatches(mut self, limit: u32) -> Self {
        self.config.max_concurrent_dispatches = limit;
        self
    }

    /// Build the router and register every configured service.
    ///
    /// Fails on invalid configuration, invalid destination names, or a
    /// destination registered twice.
    pub fn build(self) -> Result<Router> {
        let router = Router::from_config(&self.config)?;
        for (destination, handler) in self.services {
            router.register_service_callback(&destination, handler)?;
        }
        Ok(router)
    }
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

static NEXT_ROUTER_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    /// Dispatches of one router that enclose the current task's execution.
    static DISPATCH_SCOPE: DispatchScope;
}

#[derive(Clone, Copy)]
struct DispatchScope {
    router_id: u64,
    depth: usize,
}

/// Counts one running dispatch; decrements on drop, including unwinds.
struct InFlightGuard<'a> {
    count: &'a AtomicUsize,
    drained: &'a Notify,
}

impl<'a> InFlightGuard<'a> {
    fn enter(count: &'a AtomicUsize, drained: &'a Notify) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self { count, drained }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
        self.drained.notify_waiters();
    }
}

/// Routes requests to the single handler registered for each destination.
///
/// `Router` is `Send + Sync`; share it with `Arc` between the transport and
/// the services that register themselves.
pub struct Router {
    /// Identifies this router's dispatches in the task-local scope.
    id: u64,
    /// Destination to handler mapping.
    registry: Registry,
    /// Set once by `close`.
    closed: AtomicBool,
    /// One permit per running dispatch.
    dispatch_permits: Arc<Semaphore>,
    /// Dispatches currently running.
    in_flight: AtomicUsize,
    /// Woken whenever a dispatch finishes.
    drained: Notify,
}

impl Router {
    /// Create a router with the default configuration.
    pub fn new() -> Self {
        Self::with_limit(RouterConfig::default().max_concurrent_dispatches)
    }

    /// Create a new router builder.
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Create a router from a validated configuration.
    pub fn from_config(config: &RouterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_limit(config.max_concurrent_dispatches))
    }

    fn with_limit(max_concurrent_dispatches: u32) -> Self {
        Self {
            id: NEXT_ROUTER_ID.fetch_add(1, Ordering::Relaxed),
            registry: Registry::new(),
            closed: AtomicBool::new(false),
            dispatch_permits: Arc::new(Semaphore::new(max_concurrent_dispatches as usize)),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Register `handler` as the sole handler for `destination`.
    ///
    /// Fails with `DuplicateRegistration` if a handler is already present;
    /// the existing handler is kept. Concurrent attempts on the same
    /// destination produce exactly one success.
    pub fn register_service_callback(
        &self,
        destination: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<()> {
        self.ensure_active()?;

        let destination = match self.registry.insert(destination, Arc::clone(&handler)) {
            Ok(d) => d,
            Err(e) => {
                if let RouterError::DuplicateRegistration(d) = &e {
                    tracing::warn!("Duplicate registration for destination {}", d);
                }
                return Err(e);
            }
        };

        // Close may have cleared the registry between the check and the insert.
        if self.is_closed() {
            self.registry.remove_if_same(destination.as_str(), &handler);
            return Err(RouterError::RouterClosed);
        }

        tracing::debug!("Registered handler for destination {}", destination);
        Ok(())
    }

    /// Register an async closure for `destination`.
    pub fn register_fn<F, Fut>(&self, destination: &str, handler: F) -> Result<()>
    where
        F: Fn(RequestContext, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register_service_callback(destination, Arc::new(handler_fn(handler)))
    }

    /// Get the handler registered for `destination`.
    ///
    /// The returned handler stays valid even if the destination is
    /// unregistered or the router shuts down afterwards.
    pub fn get_callback_for_destination(&self, destination: &str) -> Result<Arc<dyn Handler>> {
        self.ensure_active()?;
        self.registry.get(destination)
    }

    /// Remove and return the handler registered for `destination`.
    pub fn unregister_service_callback(&self, destination: &str) -> Result<Arc<dyn Handler>> {
        self.ensure_active()?;
        let handler = self.registry.remove(destination)?;
        tracing::debug!("Unregistered handler for destination {}", destination);
        Ok(handler)
    }

    /// Resolve `destination` and run its handler with `ctx` and `message`.
    ///
    /// The context and message are passed through unmodified. No router
    /// lock is held while the handler runs.
    pub async fn dispatch(
        &self,
        destination: &str,
        ctx: RequestContext,
        message: Message,
    ) -> HandlerResult {
        self.ensure_active()?;

        // Counted before the permit so a concurrent drain cannot miss it
        let _in_flight = InFlightGuard::enter(&self.in_flight, &self.drained);

        // Permit is held until the handler completes
        let _permit = match self.dispatch_permits.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(TryAcquireError::Closed) => return Err(RouterError::RouterClosed),
            Err(TryAcquireError::NoPermits) => {
                if self.is_closed() {
                    return Err(RouterError::RouterClosed);
                }
                tracing::warn!(
                    "Dispatch capacity reached, rejecting request {} for destination {}",
                    ctx.request_id(),
                    destination
                );
                return Err(RouterError::Saturated(destination.to_string()));
            }
        };

        let handler = self.get_callback_for_destination(destination)?;

        let scope = DispatchScope {
            router_id: self.id,
            depth: self.dispatches_held_by_current_task() + 1,
        };
        let request_id = ctx.request_id();
        let outcome = DISPATCH_SCOPE
            .scope(scope, async move { handler.handle(ctx, message).await })
            .await;

        match outcome {
            Ok(response) => Ok(response),
            Err(e) => {
                tracing::error!(
                    "Handler error for destination {} (request {}): {}",
                    destination,
                    request_id,
                    e
                );
                Err(e)
            }
        }
    }

    /// Move the router to the closed state without waiting.
    ///
    /// New operations fail with `RouterClosed` from now on and the registry
    /// is emptied. Returns `true` for the call that performed the transition.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }

        tracing::info!(
            "Router closing, {} dispatches in flight",
            self.in_flight()
        );
        self.registry.clear();
        self.dispatch_permits.close();
        true
    }

    /// Wait until no dispatch is running.
    ///
    /// Dispatches enclosing the caller are not waited for, so a handler may
    /// drain the router that is running it. A task spawned by a handler is
    /// outside that scope and waits for the handler too. Every call waits;
    /// cancelling one does not affect later calls.
    pub async fn drain(&self) {
        let own = self.dispatches_held_by_current_task();
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight() <= own {
                return;
            }
            notified.await;
        }
    }

    /// Close the router and wait for running dispatches to finish.
    ///
    /// Safe to call from inside a handler and safe to call again after a
    /// cancelled attempt.
    pub async fn shutdown(&self) {
        self.close();
        self.drain().await;
        tracing::info!("Router closed");
    }

    /// Whether the router has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of dispatches currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Registered destinations, sorted.
    pub fn destinations(&self) -> Vec<Destination> {
        self.registry.destinations()
    }

    /// Number of registered destinations.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Whether no destinations are registered.
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_closed() {
            Err(RouterError::RouterClosed)
        } else {
            Ok(())
        }
    }

    fn dispatches_held_by_current_task(&self) -> usize {
        DISPATCH_SCOPE
            .try_with(|scope| {
                if scope.router_id == self.id {
                    scope.depth
                } else {
                    0
                }
            })
            .unwrap_or(0)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::oneshot;

    fn noop() -> Arc<dyn Handler> {
        Arc::new(handler_fn(|_ctx, _msg| async { Ok(None) }))
    }

    #[test]
    fn test_builder_creation() {
        let router = RouterBuilder::new().build().unwrap();
        assert!(router.is_empty());
        assert!(!router.is_closed());
    }

    #[test]
    fn test_builder_method_chaining() {
        let router = Router::builder()
            .handle("lifecycle", |_ctx, _msg| async { Ok(None) })
            .handle("config", |_ctx, msg| async move { Ok(Some(msg)) })
            .service("pubsub", noop())
            .build()
            .unwrap();

        let names: Vec<String> = router.destinations().iter().map(|d| d.to_string()).collect();
        assert_eq!(names, vec!["config", "lifecycle", "pubsub"]);
    }

    #[test]
    fn test_builder_duplicate_fails() {
        let result = Router::builder()
            .service("dest", noop())
            .service("dest", noop())
            .build();
        assert!(matches!(result, Err(RouterError::DuplicateRegistration(_))));
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Router::builder().max_concurrent_dispatches(512);
        assert_eq!(builder.config.max_concurrent_dispatches, 512);

        let err = Router::builder().max_concurrent_dispatches(0).build();
        assert!(matches!(err, Err(RouterError::Config(_))));

        let err = Router::builder().max_concurrent_dispatches(u32::MAX).build();
        assert!(matches!(err, Err(RouterError::Config(_))));
    }

    #[test]
    fn test_register_and_lookup() {
        let router = Router::new();
        let handler = noop();
        router.register_service_callback("dest", Arc::clone(&handler)).unwrap();

        let found = router.get_callback_for_destination("dest").unwrap();
        assert!(Arc::ptr_eq(&found, &handler));
    }

    #[test]
    fn test_register_blank_destination() {
        let router = Router::new();
        assert!(matches!(
            router.register_service_callback("", noop()),
            Err(RouterError::InvalidDestination(_))
        ));
    }

    #[test]
    fn test_unregister() {
        let router = Router::new();
        let handler = noop();
        router.register_service_callback("dest", Arc::clone(&handler)).unwrap();

        let removed = router.unregister_service_callback("dest").unwrap();
        assert!(Arc::ptr_eq(&removed, &handler));
        assert!(matches!(
            router.get_callback_for_destination("dest"),
            Err(RouterError::DestinationNotFound(_))
        ));
        assert!(matches!(
            router.unregister_service_callback("dest"),
            Err(RouterError::DestinationNotFound(_))
        ));
        router.register_service_callback("dest", noop()).unwrap();
    }

    #[tokio::test]
    async fn test_dispatch_unknown_destination() {
        let router = Router::new();
        let err = router
            .dispatch("missing", RequestContext::default(), Message::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::DestinationNotFound(ref d) if d == "missing"));
        assert_eq!(router.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_propagates_handler_error() {
        let router = Router::new();
        router
            .register_fn("broken", |_ctx, _msg| async {
                Err(RouterError::service("broken", "no backend"))
            })
            .unwrap();

        let err = router
            .dispatch("broken", RequestContext::default(), Message::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Service { ref message, .. } if message == "no backend"));
    }

    #[tokio::test]
    async fn test_dispatch_saturated() {
        let router = Arc::new(Router::builder().max_concurrent_dispatches(1).build().unwrap());
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let started_tx = std::sync::Mutex::new(Some(started_tx));
        let release_rx = std::sync::Mutex::new(Some(release_rx));
        let gates = Arc::new((started_tx, release_rx));

        let gates_clone = gates.clone();
        router
            .register_fn("slow", move |_ctx, _msg| {
                let started = gates_clone.0.lock().unwrap().take();
                let release = gates_clone.1.lock().unwrap().take();
                async move {
                    if let Some(tx) = started {
                        let _ = tx.send(());
                    }
                    if let Some(rx) = release {
                        let _ = rx.await;
                    }
                    Ok(None)
                }
            })
            .unwrap();

        let router_clone = router.clone();
        let first = tokio::spawn(async move {
            router_clone
                .dispatch("slow", RequestContext::new(1), Message::empty())
                .await
        });
        started_rx.await.unwrap();
        assert_eq!(router.in_flight(), 1);

        let err = router
            .dispatch("slow", RequestContext::new(2), Message::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Saturated(_)));

        release_tx.send(()).unwrap();
        assert!(first.await.unwrap().is_ok());
        assert_eq!(router.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_operations_after_shutdown() {
        let router = Router::new();
        router.register_service_callback("dest", noop()).unwrap();

        router.shutdown().await;
        assert!(router.is_closed());
        assert!(router.is_empty());

        assert!(matches!(
            router.register_service_callback("other", noop()),
            Err(RouterError::RouterClosed)
        ));
        assert!(matches!(
            router.get_callback_for_destination("dest"),
            Err(RouterError::RouterClosed)
        ));
        assert!(matches!(
            router.unregister_service_callback("dest"),
            Err(RouterError::RouterClosed)
        ));
        assert!(matches!(
            router
                .dispatch("dest", RequestContext::default(), Message::empty())
                .await,
            Err(RouterError::RouterClosed)
        ));

        // Idempotent
        router.shutdown().await;
        assert!(router.is_closed());
    }

    #[tokio::test]
    async fn test_shutdown_drains_in_flight() {
        let router = Arc::new(Router::new());
        let finished = Arc::new(AtomicUsize::new(0));
        let finished_clone = finished.clone();
        router
            .register_fn("slow", move |_ctx, _msg| {
                let finished = finished_clone.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(Message::from_static(b"done")))
                }
            })
            .unwrap();

        let router_clone = router.clone();
        let in_flight = tokio::spawn(async move {
            router_clone
                .dispatch("slow", RequestContext::default(), Message::empty())
                .await
        });

        while router.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        router.shutdown().await;

        assert_eq!(finished.load(Ordering::SeqCst), 1);
        let reply = in_flight.await.unwrap().unwrap();
        assert_eq!(reply, Some(Message::from_static(b"done")));
    }

    #[tokio::test]
    async fn test_close_is_synchronous_and_one_shot() {
        let router = Router::new();
        router.register_service_callback("dest", noop()).unwrap();

        assert!(router.close());
        assert!(!router.close());
        assert!(router.is_closed());
        assert!(router.is_empty());

        // Nothing running, nothing to wait for
        tokio::time::timeout(Duration::from_millis(100), router.drain())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_handler_can_shut_down_its_router() {
        let router = Arc::new(Router::new());
        let weak = Arc::downgrade(&router);
        router
            .register_fn("stop", move |_ctx, _msg| {
                let weak = weak.clone();
                async move {
                    if let Some(router) = weak.upgrade() {
                        router.shutdown().await;
                    }
                    Ok(Some(Message::from_static(b"stopped")))
                }
            })
            .unwrap();

        let reply = tokio::time::timeout(
            Duration::from_secs(2),
            router.dispatch("stop", RequestContext::default(), Message::empty()),
        )
        .await
        .expect("shutdown from inside a handler hung")
        .unwrap();

        assert_eq!(reply, Some(Message::from_static(b"stopped")));
        assert!(router.is_closed());
        assert_eq!(router.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_handler_shutdown_still_waits_for_other_dispatches() {
        let router = Arc::new(Router::new());
        let slow_done = Arc::new(AtomicBool::new(false));
        let slow_done_clone = slow_done.clone();
        router
            .register_fn("slow", move |_ctx, _msg| {
                let done = slow_done_clone.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    done.store(true, Ordering::SeqCst);
                    Ok(None)
                }
            })
            .unwrap();

        let weak = Arc::downgrade(&router);
        let observed = Arc::new(AtomicBool::new(false));
        let observed_clone = observed.clone();
        let slow_flag = slow_done.clone();
        router
            .register_fn("stop", move |_ctx, _msg| {
                let weak = weak.clone();
                let observed = observed_clone.clone();
                let slow_flag = slow_flag.clone();
                async move {
                    if let Some(router) = weak.upgrade() {
                        router.shutdown().await;
                    }
                    observed.store(slow_flag.load(Ordering::SeqCst), Ordering::SeqCst);
                    Ok(None)
                }
            })
            .unwrap();

        let router_clone = router.clone();
        let slow = tokio::spawn(async move {
            router_clone
                .dispatch("slow", RequestContext::new(1), Message::empty())
                .await
        });
        while router.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        tokio::time::timeout(
            Duration::from_secs(2),
            router.dispatch("stop", RequestContext::new(2), Message::empty()),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(observed.load(Ordering::SeqCst));
        assert!(slow.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_retry_after_cancel_still_drains() {
        let router = Arc::new(Router::new());
        let finished = Arc::new(AtomicUsize::new(0));
        let finished_clone = finished.clone();
        router
            .register_fn("slow", move |_ctx, _msg| {
                let finished = finished_clone.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            })
            .unwrap();

        let router_clone = router.clone();
        let running = tokio::spawn(async move {
            router_clone
                .dispatch("slow", RequestContext::default(), Message::empty())
                .await
        });
        while router.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        let first = tokio::time::timeout(Duration::from_millis(10), router.shutdown()).await;
        assert!(first.is_err());
        assert!(router.is_closed());

        router.shutdown().await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(router.in_flight(), 0);
        assert!(running.await.unwrap().is_ok());
    }
}
