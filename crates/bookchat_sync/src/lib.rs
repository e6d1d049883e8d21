//! # BookChat Sync
//!
//! Mirrors BookChat messages to a remote backup.
//!
//! This crate provides:
//! - [`SyncEngine`]: moves pending messages from the store to a mirror, oldest
//!   first, and marks them synced
//! - [`RemoteMirror`]: the mirror abstraction, with [`GitMirror`] (git CLI) and
//!   [`MemoryMirror`] (in process) implementations
//! - [`SyncScheduler`]: runs passes periodically on a Tokio runtime
//!
//! ## Key Invariants
//!
//! - Messages are committed to the mirror in creation order
//! - A message is marked synced only after its commit succeeded
//! - A failed pass keeps the progress it made; the next pass resumes there
//! - At most one pass runs per engine at a time
//! - The local store stays the only source of truth for reads
//!
//! ## Example
//!
//! ```rust
//! use bookchat_core::{BoardConfig, MessageStore};
//! use bookchat_sync::{MemoryMirror, SyncEngine};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MessageStore::open_in_memory(BoardConfig::default()).unwrap());
//! store.create("hello").unwrap();
//!
//! let engine = SyncEngine::new(Arc::clone(&store), MemoryMirror::new());
//! let report = engine.sync_once().unwrap();
//! assert_eq!(report.synced.len(), 1);
//! assert_eq!(store.pending_count(), 0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod git;
mod mirror;
mod scheduler;

pub use config::{
    GitMirrorConfig, ENV_MIRROR_AUTHOR_EMAIL, ENV_MIRROR_AUTHOR_NAME, ENV_MIRROR_BRANCH,
    ENV_MIRROR_DIR, ENV_MIRROR_REMOTE,
};
pub use engine::{CancelHandle, SyncEngine, SyncReport, SyncStatus};
pub use error::{MirrorError, MirrorResult, SyncError, SyncResult};
pub use git::{git_available, is_git_work_tree, GitMirror, RemoteUrl};
pub use mirror::{MemoryMirror, MirrorEntry, MirroredCommit, RemoteMirror, RemoteRef};
pub use scheduler::{SchedulerHandle, SyncScheduler};
