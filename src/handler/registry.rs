//! Handler trait and the destination registry.
//!
//! The registry maps each destination to exactly one handler. Every
//! operation touches a single map entry under that entry's shard lock, so
//! register, lookup and remove of the same destination are linearizable.
//! Handlers are stored behind `Arc` and cloned out on lookup: the lock is
//! released before anything is invoked.
//!
//! The registry is internal: all access goes through [`Router`](crate::Router),
//! which enforces the closed state.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{Message, RequestContext};
use crate::destination::Destination;
use crate::error::{Result, RouterError};

/// Result type for handler functions. `None` means no response body.
pub type HandlerResult = Result<Option<Message>>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A service endpoint reachable through the router.
pub trait Handler: Send + Sync + 'static {
    /// Handle one request and produce one response.
    fn handle(&self, ctx: RequestContext, message: Message) -> BoxFuture<'static, HandlerResult>;
}

/// Adapter turning an async closure into a [`Handler`].
pub struct FnHandler<F> {
    handler: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(RequestContext, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Create a new closure handler.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(RequestContext, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle(&self, ctx: RequestContext, message: Message) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.handler)(ctx, message))
    }
}

/// Wrap an async closure as a handler.
pub fn handler_fn<F, Fut>(handler: F) -> FnHandler<F>
where
    F: Fn(RequestContext, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler::new(handler)
}

/// Concurrent map from destination to its single handler.
#[derive(Default)]
pub(crate) struct Registry {
    handlers: DashMap<Destination, Arc<dyn Handler>>,
}

impl Registry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Install `handler` for `destination` unless one is already present.
    ///
    /// On conflict the existing handler is left in place.
    pub fn insert(
        &self,
        destination: impl AsRef<str>,
        handler: Arc<dyn Handler>,
    ) -> Result<Destination> {
        let destination = Destination::new(destination)?;
        match self.handlers.entry(destination) {
            Entry::Occupied(entry) => Err(RouterError::DuplicateRegistration(entry.key().clone())),
            Entry::Vacant(entry) => {
                let key = entry.key().clone();
                entry.insert(handler);
                Ok(key)
            }
        }
    }

    /// Get the handler registered for `destination`.
    pub fn get(&self, destination: &str) -> Result<Arc<dyn Handler>> {
        self.handlers
            .get(destination)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RouterError::DestinationNotFound(destination.to_string()))
    }

    /// Remove and return the handler registered for `destination`.
    pub fn remove(&self, destination: &str) -> Result<Arc<dyn Handler>> {
        self.handlers
            .remove(destination)
            .map(|(_, handler)| handler)
            .ok_or_else(|| RouterError::DestinationNotFound(destination.to_string()))
    }

    /// Remove the entry for `destination` only if it still holds `handler`.
    pub fn remove_if_same(&self, destination: &str, handler: &Arc<dyn Handler>) -> bool {
        self.handlers
            .remove_if(destination, |_, current| Arc::ptr_eq(current, handler))
            .is_some()
    }

    /// Registered destinations, sorted.
    pub fn destinations(&self) -> Vec<Destination> {
        let mut names: Vec<Destination> = self.handlers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered destinations.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no destinations are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.handlers.clear();
    }
}
