//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The input is not a structurally valid document or envelope.
    #[error("malformed document: {message}")]
    Malformed {
        /// Description of the structural error.
        message: String,
    },

    /// The document declares a format version newer than this build.
    #[error("unsupported format version {found} (newest supported is {supported})")]
    UnsupportedVersion {
        /// Version found in the document.
        found: u64,
        /// Newest version this build understands.
        supported: u32,
    },

    /// The input exceeds the configured size limit.
    #[error("document too large: {size} bytes exceeds limit of {limit}")]
    TooLarge {
        /// Input size in bytes.
        size: usize,
        /// Configured limit in bytes.
        limit: usize,
    },

    /// Failed to encode a document.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },
}

impl CodecError {
    /// Create a malformed document error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }
}
