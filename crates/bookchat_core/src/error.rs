//! Error types for the message store.

use crate::types::MessageId;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Input rejected before anything was persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The message content was empty.
    #[error("message content must not be empty")]
    EmptyContent,

    /// The message content exceeded the configured maximum.
    #[error("message content is {len} characters, maximum is {max}")]
    ContentTooLong {
        /// Length of the rejected content, in characters.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A sync mark was attempted with an empty remote ref.
    #[error("remote ref must not be empty")]
    EmptyRemoteRef,
}

/// Errors that can occur in message store operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid input.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// No message with the given id exists.
    #[error("message {id} not found")]
    NotFound {
        /// The id that was looked up.
        id: MessageId,
    },

    /// The message is already synced.
    #[error("message {id} is already synced as {remote_ref}")]
    AlreadySynced {
        /// The message id.
        id: MessageId,
        /// The remote ref it was synced with.
        remote_ref: String,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] bookchat_storage::StorageError),

    /// A record payload could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// The message log is corrupted.
    #[error("message log corrupted at offset {offset}: {message}")]
    Corruption {
        /// Byte offset of the offending record.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// A record checksum did not match.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// Another process owns the store directory.
    #[error("store locked: another process owns {}", path.display())]
    StoreLocked {
        /// The locked directory.
        path: PathBuf,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// I/O error outside the storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(id: MessageId) -> Self {
        Self::NotFound { id }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a corruption error for the record at `offset`.
    pub fn corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::Corruption {
            offset,
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true if the caller sent something the store will never accept
    /// as-is, so retrying the same call is pointless.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CoreError::Validation(_) | CoreError::NotFound { .. } | CoreError::AlreadySynced { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_are_client_facing() {
        let err = CoreError::from(ValidationError::ContentTooLong { len: 1001, max: 1000 });
        assert!(err.is_client_error());
        assert!(err.to_string().contains("1001"));
        assert!(err.to_string().contains("1000"));

        let err = CoreError::from(ValidationError::EmptyContent);
        assert_eq!(
            err.to_string(),
            "validation failed: message content must not be empty"
        );
    }

    #[test]
    fn classification() {
        assert!(CoreError::not_found(MessageId::new(3)).is_client_error());
        assert!(!CoreError::corruption(0, "bad").is_client_error());
        assert!(!CoreError::from(io::Error::new(io::ErrorKind::Other, "x")).is_client_error());
    }

    #[test]
    fn already_synced_names_ref() {
        let err = CoreError::AlreadySynced {
            id: MessageId::new(7),
            remote_ref: "abc123".into(),
        };
        assert_eq!(err.to_string(), "message 7 is already synced as abc123");
    }
}
