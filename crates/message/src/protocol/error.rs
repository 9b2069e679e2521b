use std::io;
use thiserror::Error;

/// The error kinds surfaced by message parsing, mutation and body access.
///
/// Every fault propagates synchronously to the immediate caller, nothing in
/// this crate retries.
#[derive(Error, Debug)]
pub enum MessageError {
    /// The raw buffer does not follow the message grammar.
    #[error("malformed message: {reason}")]
    Malformed { reason: String },

    /// A caller supplied a value the target field cannot hold.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// A registered body decoder rejected the payload.
    #[error("failed to decode {media_type} body: {reason}")]
    Decode { media_type: String, reason: String },

    /// The stream was not opened with the capability the operation needs.
    #[error("stream is not {capability}")]
    MissingCapability { capability: Capability },

    /// An uploaded file cannot be read or moved in its current state.
    #[error("upload error: {reason}")]
    Upload { reason: String },

    /// The stream source or the file system failed.
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

/// Stream capabilities checked before an operation touches the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Readable,
    Writable,
    Seekable,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Readable => f.write_str("readable"),
            Capability::Writable => f.write_str("writable"),
            Capability::Seekable => f.write_str("seekable"),
        }
    }
}

impl MessageError {
    pub fn malformed<S: ToString>(str: S) -> Self {
        Self::Malformed { reason: str.to_string() }
    }

    pub fn invalid_argument<S: ToString>(str: S) -> Self {
        Self::InvalidArgument { reason: str.to_string() }
    }

    pub fn decode<M: ToString, S: ToString>(media_type: M, str: S) -> Self {
        Self::Decode { media_type: media_type.to_string(), reason: str.to_string() }
    }

    pub fn missing_capability(capability: Capability) -> Self {
        Self::MissingCapability { capability }
    }

    pub fn upload<S: ToString>(str: S) -> Self {
        Self::Upload { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Returns the capability a [`MessageError::MissingCapability`] names.
    pub fn capability(&self) -> Option<Capability> {
        match self {
            Self::MissingCapability { capability } => Some(*capability),
            _ => None,
        }
    }
}

pub type Result<T, E = MessageError> = std::result::Result<T, E>;
