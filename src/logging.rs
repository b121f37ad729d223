//! Tracing subscriber setup.
//!
//! The library itself only emits `tracing` events. Binaries (and the demo)
//! call [`init`] once at startup to print them.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Result, RouterError};

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence; `default_filter` is used when it is unset
/// or invalid. Returns `RouterError::Config` if a global subscriber is
/// already installed.
pub fn init(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| RouterError::Config(format!("invalid log filter {default_filter:?}: {e}")))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| RouterError::Config(format!("tracing already initialized: {e}")))
}
