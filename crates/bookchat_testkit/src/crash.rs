//! Crash simulation for message log recovery tests.
//!
//! [`CrashableBackend`] wraps an in-memory log whose bytes stay reachable
//! through a [`CrashProbe`] after the store that owned the backend is gone.
//! Reopening a store over [`CrashProbe::surviving_bytes`] is the same as
//! restarting the process after the crash.

use bookchat_core::{BoardConfig, CoreResult, MessageStore};
use bookchat_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct CrashState {
    bytes: Mutex<Vec<u8>>,
    crash_after_bytes: AtomicU64,
    crashed: AtomicBool,
    fail_sync: AtomicBool,
}

fn simulated(what: &str) -> StorageError {
    StorageError::Io(io::Error::new(io::ErrorKind::Other, format!("simulated {what}")))
}

/// A storage backend that can crash mid-write.
///
/// After a crash every further operation fails, so a torn record is left
/// exactly as it hit the disk. A failing `sync` is not a crash: the store
/// can still roll the record back.
#[derive(Debug)]
pub struct CrashableBackend {
    state: Arc<CrashState>,
}

/// Controls a [`CrashableBackend`] and reads what it holds.
#[derive(Debug, Clone)]
pub struct CrashProbe {
    state: Arc<CrashState>,
}

impl CrashableBackend {
    /// Creates an empty backend and its probe.
    pub fn new() -> (Self, CrashProbe) {
        Self::with_data(Vec::new())
    }

    /// Creates a backend holding `data` and its probe.
    pub fn with_data(data: Vec<u8>) -> (Self, CrashProbe) {
        let state = Arc::new(CrashState {
            bytes: Mutex::new(data),
            crash_after_bytes: AtomicU64::new(u64::MAX),
            crashed: AtomicBool::new(false),
            fail_sync: AtomicBool::new(false),
        });
        (
            Self {
                state: Arc::clone(&state),
            },
            CrashProbe { state },
        )
    }

    fn check_alive(&self) -> StorageResult<()> {
        if self.state.crashed.load(Ordering::SeqCst) {
            Err(simulated("crash: backend is gone"))
        } else {
            Ok(())
        }
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let bytes = self.state.bytes.lock().unwrap();
        let size = bytes.len() as u64;
        let end = offset.checked_add(len as u64);
        match end {
            Some(end) if end <= size => Ok(bytes[offset as usize..end as usize].to_vec()),
            _ => Err(StorageError::ReadPastEnd { offset, len, size }),
        }
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.check_alive()?;
        let mut bytes = self.state.bytes.lock().unwrap();
        let offset = bytes.len() as u64;
        let limit = self.state.crash_after_bytes.load(Ordering::SeqCst);

        if offset + data.len() as u64 > limit {
            let partial = limit.saturating_sub(offset) as usize;
            bytes.extend_from_slice(&data[..partial.min(data.len())]);
            self.state.crashed.store(true, Ordering::SeqCst);
            return Err(simulated("crash during write"));
        }

        bytes.extend_from_slice(data);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.check_alive()
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.state.bytes.lock().unwrap().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.check_alive()?;
        if self.state.fail_sync.load(Ordering::SeqCst) {
            return Err(simulated("sync failure"));
        }
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.check_alive()?;
        let mut bytes = self.state.bytes.lock().unwrap();
        let size = bytes.len() as u64;
        if new_size > size {
            return Err(StorageError::InvalidTruncate {
                requested: new_size,
                size,
            });
        }
        bytes.truncate(new_size as usize);
        Ok(())
    }
}

impl CrashProbe {
    /// Crashes once the log would grow past `total_bytes`. The write that
    /// crosses the limit is cut off there.
    pub fn crash_at_size(&self, total_bytes: u64) {
        self.state
            .crash_after_bytes
            .store(total_bytes, Ordering::SeqCst);
    }

    /// Crashes partway through the next write, `bytes_into_record` bytes in.
    pub fn crash_during_next_write(&self, bytes_into_record: u64) {
        self.crash_at_size(self.size() + bytes_into_record);
    }

    /// Makes `sync` fail (or succeed again).
    pub fn set_fail_sync(&self, fail: bool) {
        self.state.fail_sync.store(fail, Ordering::SeqCst);
    }

    /// Returns whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.state.crashed.load(Ordering::SeqCst)
    }

    /// Current length of the log.
    pub fn size(&self) -> u64 {
        self.state.bytes.lock().unwrap().len() as u64
    }

    /// The bytes that made it to "disk".
    pub fn surviving_bytes(&self) -> Vec<u8> {
        self.state.bytes.lock().unwrap().clone()
    }

    /// Opens a fresh store over the surviving bytes, as a restart would.
    pub fn restart(&self, config: BoardConfig) -> CoreResult<MessageStore> {
        MessageStore::open_with_backend(
            config,
            Box::new(InMemoryBackend::with_data(self.surviving_bytes())),
        )
    }
}

/// Opens a store over a fresh crashable backend.
pub fn crashable_store(config: BoardConfig) -> (MessageStore, CrashProbe) {
    let (backend, probe) = CrashableBackend::new();
    let store = MessageStore::open_with_backend(config, Box::new(backend))
        .expect("Failed to open store over crashable backend");
    (store, probe)
}
