//! Store directory layout and locking.
//!
//! ```text
//! <data_dir>/
//! ├─ LOCK            # advisory lock, held while a store is open
//! └─ messages.log    # the message log
//! ```
//!
//! The LOCK file makes the store the only writer of its log, even across
//! processes.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "messages.log";

/// An open, exclusively locked store directory.
///
/// The lock is released when this value is dropped.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens (and if needed creates) the directory and takes its lock.
    ///
    /// # Errors
    ///
    /// - [`CoreError::StoreLocked`] if another store holds the lock
    /// - [`CoreError::Config`] if `path` exists but is not a directory
    /// - I/O errors while creating the directory or lock file
    pub fn open(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(CoreError::config(format!(
                "data directory is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::StoreLocked {
                path: path.to_path_buf(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the message log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_missing_directory() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("board");

        let dir = StoreDir::open(&path).unwrap();
        assert!(path.is_dir());
        assert!(path.join("LOCK").exists());
        assert_eq!(dir.log_path(), path.join("messages.log"));
        assert_eq!(dir.path(), path);
    }

    #[test]
    fn second_open_is_locked_out() {
        let tmp = tempdir().unwrap();
        let _first = StoreDir::open(tmp.path()).unwrap();

        let second = StoreDir::open(tmp.path());
        assert!(matches!(second, Err(CoreError::StoreLocked { .. })));
    }

    #[test]
    fn lock_released_on_drop() {
        let tmp = tempdir().unwrap();
        {
            let _dir = StoreDir::open(tmp.path()).unwrap();
        }
        StoreDir::open(tmp.path()).unwrap();
    }

    #[test]
    fn file_path_is_rejected() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        fs::write(&file, b"x").unwrap();

        assert!(matches!(StoreDir::open(&file), Err(CoreError::Config { .. })));
    }
}
