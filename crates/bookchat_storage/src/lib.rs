//! # BookChat Storage
//!
//! Append-only byte storage for the BookChat message log.
//!
//! The message store never talks to the file system directly. It frames its
//! records and hands the bytes to a [`StorageBackend`], which only knows how
//! to append, read back, flush and cut off a tail. Record framing, checksums
//! and recovery all live in `bookchat_core`.
//!
//! ## Backends
//!
//! - [`InMemoryBackend`] - ephemeral boards and tests
//! - [`FileBackend`] - the on-disk `messages.log`
//!
//! ## Example
//!
//! ```rust
//! use bookchat_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut log = InMemoryBackend::new();
//! let first = log.append(b"record one").unwrap();
//! let second = log.append(b"record two").unwrap();
//! assert_eq!(first, 0);
//! assert_eq!(second, 10);
//! assert_eq!(log.read_at(second, 10).unwrap(), b"record two");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
