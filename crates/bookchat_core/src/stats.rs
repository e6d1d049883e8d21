//! Store statistics.
//!
//! Counters are atomic and can be read while the store is in use.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters kept by a [`crate::MessageStore`].
#[derive(Debug, Default)]
pub struct StoreStats {
    messages_created: AtomicU64,
    messages_synced: AtomicU64,
    validation_failures: AtomicU64,
    already_synced: AtomicU64,
    reads: AtomicU64,
    bytes_written: AtomicU64,
    records_replayed: AtomicU64,
    torn_bytes_discarded: AtomicU64,
}

impl StoreStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_create(&self, bytes: u64) {
        self.messages_created.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_sync_mark(&self, bytes: u64) {
        self.messages_synced.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_already_synced(&self) {
        self.already_synced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_replay(&self, records: u64, torn_bytes: u64) {
        self.records_replayed.fetch_add(records, Ordering::Relaxed);
        self.torn_bytes_discarded
            .fetch_add(torn_bytes, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of the counters.
    pub fn snapshot(&self) -> StoreStatsSnapshot {
        StoreStatsSnapshot {
            messages_created: self.messages_created.load(Ordering::Relaxed),
            messages_synced: self.messages_synced.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            already_synced: self.already_synced.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            records_replayed: self.records_replayed.load(Ordering::Relaxed),
            torn_bytes_discarded: self.torn_bytes_discarded.load(Ordering::Relaxed),
        }
    }
}

/// A copy of [`StoreStats`] at one point in time.
///
/// Counts cover the lifetime of this store instance, not of the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreStatsSnapshot {
    /// Messages created.
    pub messages_created: u64,
    /// Messages marked synced.
    pub messages_synced: u64,
    /// Creates or sync marks rejected by validation.
    pub validation_failures: u64,
    /// Sync marks rejected because the message was already synced.
    pub already_synced: u64,
    /// Read operations served (list, get, list_pending, list_since).
    pub reads: u64,
    /// Bytes appended to the log.
    pub bytes_written: u64,
    /// Records replayed when the store was opened.
    pub records_replayed: u64,
    /// Bytes of a torn trailing record dropped during replay.
    pub torn_bytes_discarded: u64,
}
