//! # BookChat Core
//!
//! The message store behind the BookChat board.
//!
//! This crate provides:
//! - [`MessageStore`]: durable, ordered storage of messages with a per-message
//!   sync state
//! - [`BoardConfig`]: the explicit, validated configuration for a board
//! - the on-disk record log format and its crash recovery
//!
//! ## Key Invariants
//!
//! - Message ids are assigned by the store, strictly increasing, never reused
//! - A message is `Synced` iff it carries a remote ref, and `Synced` is terminal
//! - A mutation is visible to readers only after its record is durable
//! - Exactly one writer: mutations are serialized, readers see a consistent snapshot
//!
//! ## Example
//!
//! ```rust
//! use bookchat_core::{BoardConfig, ListQuery, MessageStore};
//!
//! let store = MessageStore::open_in_memory(BoardConfig::default()).unwrap();
//! let first = store.create("hello").unwrap();
//! store.create("world").unwrap();
//!
//! let page = store.list(ListQuery::new().limit(1));
//! assert_eq!(page[0].content, "world");
//!
//! store.mark_synced(first.id, "4b825dc6").unwrap();
//! assert_eq!(store.pending_count(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod dir;
mod error;
mod record;
mod stats;
mod store;
mod types;

pub use config::BoardConfig;
pub use dir::StoreDir;
pub use error::{CoreError, CoreResult, ValidationError};
pub use record::{compute_crc32, LogRecord, RecordKind};
pub use stats::{StoreStats, StoreStatsSnapshot};
pub use store::MessageStore;
pub use types::{ListLimit, ListQuery, Message, MessageId, SyncState};

/// Version of the core crate, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
