//! Message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a message.
///
/// Ids are assigned by the store in creation order, start at 1, and are
/// never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Creates a message id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the id that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Whether a message has been mirrored to the remote.
///
/// The remote ref lives inside the `Synced` variant, so a synced message
/// without a ref (or a pending one with a ref) cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    /// Stored locally, not yet mirrored.
    Pending,
    /// Mirrored; terminal.
    Synced {
        /// Identifier of the mirror commit (a commit hash for Git).
        remote_ref: String,
        /// When the store accepted the sync mark.
        synced_at: DateTime<Utc>,
    },
}

impl SyncState {
    /// Returns true for [`SyncState::Pending`].
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, SyncState::Pending)
    }

    /// Returns true for [`SyncState::Synced`].
    #[must_use]
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncState::Synced { .. })
    }

    /// Returns the remote ref of a synced message.
    #[must_use]
    pub fn remote_ref(&self) -> Option<&str> {
        match self {
            SyncState::Pending => None,
            SyncState::Synced { remote_ref, .. } => Some(remote_ref),
        }
    }
}

/// A message on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned id.
    pub id: MessageId,
    /// Message text.
    pub content: String,
    /// Creation time; non-decreasing in id order.
    pub created_at: DateTime<Utc>,
    /// Mirror state.
    pub sync_state: SyncState,
}

impl Message {
    /// Returns true if the message has been mirrored.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.sync_state.is_synced()
    }

    /// Returns the mirror commit id, if synced.
    #[must_use]
    pub fn remote_ref(&self) -> Option<&str> {
        self.sync_state.remote_ref()
    }
}

/// How many messages a listing may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListLimit {
    /// Use the board's default page size.
    #[default]
    Default,
    /// At most this many, still capped by the board's maximum page size.
    Count(usize),
    /// No limit. For maintenance tooling, not for request handlers.
    Unbounded,
}

/// Paging parameters for [`crate::MessageStore::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListQuery {
    /// Page size.
    pub limit: ListLimit,
    /// Number of newest messages to skip.
    pub offset: usize,
}

impl ListQuery {
    /// Default page at offset 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message, newest first.
    #[must_use]
    pub fn all() -> Self {
        Self {
            limit: ListLimit::Unbounded,
            offset: 0,
        }
    }

    /// Sets the page size.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = ListLimit::Count(limit);
        self
    }

    /// Sets the offset.
    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}
