//! Router configuration.
//!
//! Loaded from JSON; every field is optional and falls back to its default.
//!
//! ```
//! use ipc_router::config::RouterConfig;
//!
//! let config = RouterConfig::from_json_str(r#"{ "max_concurrent_dispatches": 16 }"#).unwrap();
//! assert_eq!(config.max_concurrent_dispatches, 16);
//! assert_eq!(config.request_channel_capacity, 1024);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};

/// Default maximum concurrent dispatches.
pub const DEFAULT_MAX_CONCURRENT_DISPATCHES: u32 = 256;

/// Default dispatcher request channel capacity.
pub const DEFAULT_REQUEST_CHANNEL_CAPACITY: usize = 1024;

/// Largest accepted `max_concurrent_dispatches`.
///
/// Equals the semaphore permit limit on 32-bit targets.
pub const MAX_CONCURRENT_DISPATCHES_LIMIT: u32 = u32::MAX >> 3;

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Tunables for a [`Router`](crate::Router) and its dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
    /// Upper bound on handler invocations running through `Router::dispatch`.
    pub max_concurrent_dispatches: u32,
    /// Queue depth between the transport and the dispatcher loop.
    pub request_channel_capacity: usize,
    /// `tracing-subscriber` filter directive.
    pub log_filter: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_concurrent_dispatches: DEFAULT_MAX_CONCURRENT_DISPATCHES,
            request_channel_capacity: DEFAULT_REQUEST_CHANNEL_CAPACITY,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl RouterConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Reject limits the router cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_dispatches == 0 {
            return Err(RouterError::Config(
                "max_concurrent_dispatches must be at least 1".into(),
            ));
        }
        if self.max_concurrent_dispatches > MAX_CONCURRENT_DISPATCHES_LIMIT {
            return Err(RouterError::Config(format!(
                "max_concurrent_dispatches must be at most {MAX_CONCURRENT_DISPATCHES_LIMIT}"
            )));
        }
        if self.request_channel_capacity == 0 {
            return Err(RouterError::Config(
                "request_channel_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
