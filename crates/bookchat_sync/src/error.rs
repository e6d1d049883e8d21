//! Error types for mirroring and sync passes.

use bookchat_core::{CoreError, MessageId};
use std::io;
use thiserror::Error;

/// Result type for mirror operations.
pub type MirrorResult<T> = Result<T, MirrorError>;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised by a [`crate::RemoteMirror`].
#[derive(Error, Debug)]
pub enum MirrorError {
    /// Reading or writing the work tree failed.
    #[error("mirror I/O error: {0}")]
    Io(#[from] io::Error),

    /// A git command exited unsuccessfully.
    #[error("`{command}` failed ({status}): {stderr}")]
    Command {
        /// The command line that was run.
        command: String,
        /// Exit status as reported by the OS.
        status: String,
        /// Trimmed standard error.
        stderr: String,
    },

    /// Pushing to the remote failed.
    #[error("push to {remote} failed: {stderr}")]
    Push {
        /// The remote that rejected the push.
        remote: String,
        /// Trimmed standard error.
        stderr: String,
    },

    /// The configured remote is not usable.
    #[error("invalid remote: {0}")]
    InvalidRemote(String),

    /// The mirror configuration is not usable.
    #[error("invalid mirror configuration: {0}")]
    InvalidConfig(String),

    /// A mirror entry could not be serialized.
    #[error("could not encode mirror entry: {0}")]
    Encode(#[from] serde_json::Error),

    /// A failure injected by a test mirror.
    #[error("scripted failure: {0}")]
    Scripted(String),
}

impl MirrorError {
    /// Returns true if the same commit may succeed on a later pass.
    pub fn is_retryable(&self) -> bool {
        match self {
            MirrorError::Io(_)
            | MirrorError::Command { .. }
            | MirrorError::Push { .. }
            | MirrorError::Scripted(_) => true,
            MirrorError::InvalidRemote(_)
            | MirrorError::InvalidConfig(_)
            | MirrorError::Encode(_) => false,
        }
    }
}

/// Errors returned by [`crate::SyncEngine::sync_once`].
#[derive(Error, Debug)]
pub enum SyncError {
    /// Mirroring one message failed. Messages before it in the pass stay
    /// synced; this one and everything after it stay pending.
    #[error("mirroring message {message_id} failed: {source}")]
    Mirror {
        /// The message that could not be mirrored.
        message_id: MessageId,
        /// What the mirror reported.
        #[source]
        source: MirrorError,
    },

    /// The message store failed.
    #[error("store error: {0}")]
    Store(#[from] CoreError),

    /// Another pass is in flight on this engine.
    #[error("a sync pass is already running")]
    AlreadyRunning,

    /// The pass was cancelled before it finished.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Returns the message the pass stopped at, if the failure is tied to one.
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            SyncError::Mirror { message_id, .. } => Some(*message_id),
            _ => None,
        }
    }

    /// Returns true if running the pass again later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Mirror { source, .. } => source.is_retryable(),
            SyncError::Store(e) => matches!(e, CoreError::Storage(_) | CoreError::Io(_)),
            SyncError::AlreadyRunning => true,
            SyncError::Cancelled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_retryable_errors() {
        assert!(MirrorError::Scripted("boom".into()).is_retryable());
        assert!(MirrorError::Push {
            remote: "origin".into(),
            stderr: "rejected".into()
        }
        .is_retryable());
        assert!(!MirrorError::InvalidRemote("ftp://x".into()).is_retryable());
        assert!(!MirrorError::InvalidConfig("empty branch".into()).is_retryable());
    }

    #[test]
    fn sync_error_carries_message_id() {
        let err = SyncError::Mirror {
            message_id: MessageId::new(2),
            source: MirrorError::Scripted("write 2".into()),
        };
        assert_eq!(err.message_id(), Some(MessageId::new(2)));
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "mirroring message 2 failed: scripted failure: write 2"
        );

        assert_eq!(SyncError::Cancelled.message_id(), None);
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn store_errors_classified() {
        let err = SyncError::from(CoreError::not_found(MessageId::new(1)));
        assert!(!err.is_retryable());

        let err = SyncError::from(CoreError::from(io::Error::new(
            io::ErrorKind::Other,
            "disk gone",
        )));
        assert!(err.is_retryable());
    }

    #[test]
    fn command_error_display() {
        let err = MirrorError::Command {
            command: "git commit".into(),
            status: "exit status: 1".into(),
            stderr: "nothing to commit".into(),
        };
        assert_eq!(
            err.to_string(),
            "`git commit` failed (exit status: 1): nothing to commit"
        );
    }
}
