//! Destination names.
//!
//! A [`Destination`] names a logical service endpoint. Names are opaque:
//! the only rule is that they are not empty or blank.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, RouterError};

/// Validated, cheaply cloneable destination name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Destination(Arc<str>);

impl Destination {
    /// Create a destination, rejecting empty and whitespace-only names.
    pub fn new(name: impl AsRef<str>) -> Result<Self> {
        let name = name.as_ref();
        if name.trim().is_empty() {
            return Err(RouterError::InvalidDestination(name.to_string()));
        }
        Ok(Self(Arc::from(name)))
    }

    /// Get the name.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Destination {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Destination {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for Destination {
    type Error = RouterError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<String> for Destination {
    type Error = RouterError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}
