//! Request context and message payloads.
//!
//! Both types are opaque to the router: they are handed to the handler
//! exactly as the transport produced them.
//!
//! # Example
//!
//! ```
//! use ipc_router::handler::{Message, RequestContext};
//!
//! let ctx = RequestContext::new(7)
//!     .with_client_id("main-service")
//!     .with_metadata("opcode", "subscribe");
//! assert_eq!(ctx.client_id(), Some("main-service"));
//!
//! let msg = Message::from_static(b"hello");
//! assert_eq!(msg.as_bytes(), b"hello");
//! ```

use std::collections::BTreeMap;

use bytes::Bytes;

/// Caller identity and metadata for a single request.
///
/// `RequestContext` is `Clone` so a handler can move it into spawned tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Identity of the calling client, if the transport knows it.
    client_id: Option<String>,
    /// Transport-assigned request ID (0 = unsolicited).
    request_id: u32,
    /// Free-form metadata supplied by the transport.
    metadata: BTreeMap<String, String>,
}

impl RequestContext {
    /// Create a context for the given request ID.
    pub fn new(request_id: u32) -> Self {
        Self {
            request_id,
            ..Self::default()
        }
    }

    /// Attach the calling client's identity.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Get the client ID.
    #[inline]
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Get the request ID.
    #[inline]
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    /// Look up a metadata entry.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Opaque message payload (zero-copy).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message(Bytes);

impl Message {
    /// Create from bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Create an empty message.
    pub fn empty() -> Self {
        Self(Bytes::new())
    }

    /// Create from a static slice without copying.
    pub fn from_static(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }

    /// Get the bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Into bytes.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Bytes> for Message {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}
