use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use super::Stream;
use crate::protocol::Result;

/// The body handle stored in every message.
///
/// Cloning a `Body` shares the underlying [`Stream`]: two messages produced by
/// `with_*` calls read and write the same bytes until one of them is given a
/// new body. Use [`Body::try_clone_contents`] for an independent copy.
#[derive(Debug, Clone)]
pub struct Body {
    stream: Arc<Mutex<Stream>>,
}

impl Body {
    pub fn new(stream: Stream) -> Self {
        Self { stream: Arc::new(Mutex::new(stream)) }
    }

    pub fn empty() -> Self {
        Self::new(Stream::memory())
    }

    /// Locks the stream for direct access.
    pub fn lock(&self) -> MutexGuard<'_, Stream> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn size(&self) -> Option<u64> {
        self.lock().size()
    }

    /// Whether the body is known to hold no bytes.
    pub fn is_empty(&self) -> bool {
        self.size() == Some(0)
    }

    /// Reads the whole body, rewinding first when the stream is seekable.
    pub fn to_bytes(&self) -> Result<Bytes> {
        self.lock().to_bytes()
    }

    /// Copies the body bytes into a new in-memory stream.
    pub fn try_clone_contents(&self) -> Result<Body> {
        let bytes = self.to_bytes()?;
        Ok(Body::from(bytes))
    }

    /// Whether both handles point to the same stream.
    pub fn ptr_eq(&self, other: &Body) -> bool {
        Arc::ptr_eq(&self.stream, &other.stream)
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Stream> for Body {
    fn from(stream: Stream) -> Self {
        Self::new(stream)
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::new(Stream::from_bytes(bytes.to_vec()))
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(Stream::from_bytes(bytes))
    }
}

impl From<&[u8]> for Body {
    fn from(bytes: &[u8]) -> Self {
        Self::new(Stream::from_bytes(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::new(Stream::from_bytes(text))
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Self::new(Stream::from_bytes(text))
    }
}
