//! Remote mirror abstraction.

use crate::error::{MirrorError, MirrorResult};
use bookchat_core::{Message, MessageId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Identifier of a mirror commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteRef(String);

impl RemoteRef {
    /// Wraps a commit identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the mirror stores for one message.
///
/// Serialized as `{"id": .., "content": .., "timestamp": ..}` with an
/// RFC 3339 timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorEntry {
    /// Message id.
    pub id: MessageId,
    /// Message text.
    pub content: String,
    /// Creation time of the message.
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl MirrorEntry {
    /// File name of this entry inside the messages directory.
    pub fn file_name(&self) -> String {
        format!("message_{}.json", self.id)
    }

    /// Commit message used for this entry.
    pub fn commit_message(&self) -> String {
        format!("Add message {}", self.id)
    }

    /// Pretty-printed JSON with a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Encode`] if serialization fails.
    pub fn to_json(&self) -> MirrorResult<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }
}

impl From<&Message> for MirrorEntry {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            content: message.content.clone(),
            created_at: message.created_at,
        }
    }
}

/// A write-only backup of the board.
///
/// `commit` is blocking and may do network I/O. Each call records exactly
/// one entry and returns the identifier of the commit that holds it.
pub trait RemoteMirror: Send + Sync {
    /// Records one entry.
    fn commit(&self, entry: &MirrorEntry) -> MirrorResult<RemoteRef>;

    /// Short human-readable description for logs and status output.
    fn describe(&self) -> String;
}

impl<M: RemoteMirror + ?Sized> RemoteMirror for Box<M> {
    fn commit(&self, entry: &MirrorEntry) -> MirrorResult<RemoteRef> {
        (**self).commit(entry)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<M: RemoteMirror + ?Sized> RemoteMirror for Arc<M> {
    fn commit(&self, entry: &MirrorEntry) -> MirrorResult<RemoteRef> {
        (**self).commit(entry)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// A commit recorded by [`MemoryMirror`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirroredCommit {
    /// The commit identifier handed back to the caller.
    pub remote_ref: RemoteRef,
    /// The entry that was committed.
    pub entry: MirrorEntry,
}

#[derive(Debug, Default)]
struct MemoryState {
    attempts: u64,
    commits: Vec<MirroredCommit>,
}

/// An in-process mirror.
///
/// Refs are 40 hex digits derived from the previous ref and the entry, so
/// the same sequence of entries always yields the same refs.
#[derive(Debug, Default)]
pub struct MemoryMirror {
    state: Mutex<MemoryState>,
    fail_on_attempt: Option<u64>,
}

impl MemoryMirror {
    /// Creates an empty mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mirror whose `attempt`-th commit call (1-based) fails.
    pub fn failing_on(attempt: u64) -> Self {
        Self {
            state: Mutex::default(),
            fail_on_attempt: Some(attempt),
        }
    }

    /// Returns every successful commit, oldest first.
    pub fn commits(&self) -> Vec<MirroredCommit> {
        self.state.lock().commits.clone()
    }

    /// Returns the ids of committed entries, in commit order.
    pub fn committed_ids(&self) -> Vec<MessageId> {
        self.state.lock().commits.iter().map(|c| c.entry.id).collect()
    }

    /// Returns the newest commit's ref.
    pub fn head(&self) -> Option<RemoteRef> {
        self.state.lock().commits.last().map(|c| c.remote_ref.clone())
    }

    /// Number of commit calls, failed ones included.
    pub fn attempts(&self) -> u64 {
        self.state.lock().attempts
    }
}

impl RemoteMirror for MemoryMirror {
    fn commit(&self, entry: &MirrorEntry) -> MirrorResult<RemoteRef> {
        let mut state = self.state.lock();
        state.attempts += 1;
        if self.fail_on_attempt == Some(state.attempts) {
            return Err(MirrorError::Scripted(format!(
                "commit attempt {} for message {}",
                state.attempts, entry.id
            )));
        }

        let payload = entry.to_json()?;
        let mut hasher = Sha256::new();
        if let Some(parent) = state.commits.last() {
            hasher.update(parent.remote_ref.as_str().as_bytes());
        }
        hasher.update(entry.commit_message().as_bytes());
        hasher.update(payload.as_bytes());
        let hex: String = hasher
            .finalize()
            .iter()
            .take(20)
            .map(|b| format!("{b:02x}"))
            .collect();

        let remote_ref = RemoteRef::new(hex);
        state.commits.push(MirroredCommit {
            remote_ref: remote_ref.clone(),
            entry: entry.clone(),
        });
        Ok(remote_ref)
    }

    fn describe(&self) -> String {
        format!("in-memory mirror ({} commits)", self.state.lock().commits.len())
    }
}
