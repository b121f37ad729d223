//! Error types for ipc-router.

use thiserror::Error;

use crate::destination::Destination;

/// Main error type for all router operations.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Destination name is empty or blank.
    #[error("Invalid destination: {0:?}")]
    InvalidDestination(String),

    /// A handler is already registered for the destination.
    #[error("Handler already registered for destination: {0}")]
    DuplicateRegistration(Destination),

    /// No handler is registered for the destination.
    #[error("No handler registered for destination: {0}")]
    DestinationNotFound(String),

    /// The router has been shut down.
    #[error("Router closed")]
    RouterClosed,

    /// Dispatch capacity reached.
    #[error("Dispatch capacity reached for destination: {0}")]
    Saturated(String),

    /// Failure reported by a service handler.
    #[error("Service {destination} failed: {message}")]
    Service {
        /// Destination the failing handler serves.
        destination: String,
        /// Handler-provided description.
        message: String,
    },

    /// The dispatcher loop is no longer accepting requests.
    #[error("Dispatcher stopped")]
    DispatcherStopped,

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error while loading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON deserialization error (configuration only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RouterError {
    /// Build a handler failure for `destination`.
    pub fn service(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            destination: destination.into(),
            message: message.into(),
        }
    }

    /// Whether the caller can reasonably continue after this error.
    ///
    /// Lifecycle and configuration errors are not recoverable; the calling
    /// code path should stop using the router.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DuplicateRegistration(_)
                | Self::DestinationNotFound(_)
                | Self::Saturated(_)
                | Self::Service { .. }
                | Self::InvalidDestination(_)
        )
    }
}

/// Result type alias using RouterError.
pub type Result<T> = std::result::Result<T, RouterError>;
