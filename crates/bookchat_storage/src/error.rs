//! Storage error types.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a [`crate::StorageBackend`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read reached past the end of the store.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: usize,
        /// Store size at the time of the read.
        size: u64,
    },

    /// A truncation tried to grow the store.
    #[error("cannot truncate to {requested} bytes, store holds only {size}")]
    InvalidTruncate {
        /// Requested size.
        requested: u64,
        /// Current size.
        size: u64,
    },
}

impl StorageError {
    /// Returns true if the error came from the operating system rather than
    /// from a caller passing a bad range.
    pub fn is_io(&self) -> bool {
        matches!(self, StorageError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_past_end_mentions_range() {
        let err = StorageError::ReadPastEnd {
            offset: 12,
            len: 4,
            size: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("offset 12"));
        assert!(msg.contains("size 10"));
        assert!(!err.is_io());
    }

    #[test]
    fn io_errors_convert() {
        let err: StorageError = io::Error::new(io::ErrorKind::Other, "disk gone").into();
        assert!(err.is_io());
    }
}
