//! The sync engine.

use crate::error::{SyncError, SyncResult};
use crate::mirror::{MirrorEntry, RemoteMirror};
use bookchat_core::{CoreError, MessageId, MessageStore};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of one successful [`SyncEngine::sync_once`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Messages the pass tried to mirror.
    pub attempted: usize,
    /// Messages mirrored and marked synced, in order.
    pub synced: Vec<MessageId>,
    /// Messages the store already had as synced when the pass marked them.
    pub already_synced: Vec<MessageId>,
    /// Pending messages left after the pass.
    pub remaining: usize,
    /// Wall time of the pass.
    pub duration: Duration,
}

impl SyncReport {
    /// Returns true if nothing was pending.
    pub fn is_noop(&self) -> bool {
        self.attempted == 0
    }
}

/// Health of an engine, for status endpoints and the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    /// Messages still waiting to be mirrored.
    pub pending_count: usize,
    /// Error of the last failed pass; cleared by a successful pass.
    pub last_error: Option<String>,
    /// Message the last failed pass stopped at.
    pub last_failed_message: Option<MessageId>,
    /// End of the last successful pass.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Passes run, failed and cancelled ones included.
    pub passes: u64,
    /// Passes that ended in an error.
    pub failed_passes: u64,
    /// Messages marked synced by this engine.
    pub messages_synced: u64,
    /// Whether a pass is running right now.
    pub in_flight: bool,
}

#[derive(Debug, Default)]
struct EngineStats {
    last_error: Option<String>,
    last_failed_message: Option<MessageId>,
    last_success_at: Option<DateTime<Utc>>,
    passes: u64,
    failed_passes: u64,
    messages_synced: u64,
}

/// Cancels passes of the engine it came from.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Asks the running pass to stop before its next message.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Mirrors pending messages from a [`MessageStore`] to a [`RemoteMirror`].
///
/// A pass walks the pending messages oldest first, commits each one to the
/// mirror and marks it synced. The first failure ends the pass; what was
/// synced before it stays synced and the next pass resumes at the failed
/// message. The engine never sleeps or retries on its own.
pub struct SyncEngine<M: RemoteMirror> {
    store: Arc<MessageStore>,
    mirror: M,
    batch_size: usize,
    pass_lock: Mutex<()>,
    cancelled: Arc<AtomicBool>,
    stats: RwLock<EngineStats>,
}

impl<M: RemoteMirror> SyncEngine<M> {
    /// Creates an engine. The batch size comes from the store's
    /// `pending_batch_size`.
    pub fn new(store: Arc<MessageStore>, mirror: M) -> Self {
        let batch_size = store.config().pending_batch_size;
        Self {
            store,
            mirror,
            batch_size,
            pass_lock: Mutex::new(()),
            cancelled: Arc::new(AtomicBool::new(false)),
            stats: RwLock::new(EngineStats::default()),
        }
    }

    /// Sets how many pending messages one pass handles (0 = all).
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    /// Returns the mirror.
    pub fn mirror(&self) -> &M {
        &self.mirror
    }

    /// Cancels the pass in flight, if any.
    ///
    /// The pass stops before its next message with [`SyncError::Cancelled`].
    /// A cancel requested while no pass runs stops the next pass before
    /// its first message. The flag is cleared when a pass ends.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns a handle that can cancel passes from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancelled))
    }

    /// Returns the engine's status.
    pub fn status(&self) -> SyncStatus {
        let stats = self.stats.read();
        SyncStatus {
            pending_count: self.store.pending_count(),
            last_error: stats.last_error.clone(),
            last_failed_message: stats.last_failed_message,
            last_success_at: stats.last_success_at,
            passes: stats.passes,
            failed_passes: stats.failed_passes,
            messages_synced: stats.messages_synced,
            in_flight: self.pass_lock.is_locked(),
        }
    }

    /// Runs one sync pass.
    ///
    /// # Errors
    ///
    /// - [`SyncError::AlreadyRunning`] if another pass is in flight
    /// - [`SyncError::Mirror`] naming the message the mirror rejected
    /// - [`SyncError::Store`] if marking a message synced fails
    /// - [`SyncError::Cancelled`] if [`SyncEngine::cancel`] was called
    pub fn sync_once(&self) -> SyncResult<SyncReport> {
        let Some(_pass) = self.pass_lock.try_lock() else {
            return Err(SyncError::AlreadyRunning);
        };

        let start = Instant::now();
        let result = self.run_pass();
        self.cancelled.store(false, Ordering::SeqCst);

        let mut stats = self.stats.write();
        stats.passes += 1;
        match result {
            Ok(mut report) => {
                report.duration = start.elapsed();
                report.remaining = self.store.pending_count();
                stats.last_error = None;
                stats.last_failed_message = None;
                stats.last_success_at = Some(Utc::now());
                drop(stats);

                if report.is_noop() {
                    debug!("sync pass found nothing pending");
                } else {
                    info!(
                        synced = report.synced.len(),
                        remaining = report.remaining,
                        elapsed_ms = report.duration.as_millis() as u64,
                        "sync pass complete"
                    );
                }
                Ok(report)
            }
            Err(SyncError::Cancelled) => {
                drop(stats);
                info!("sync pass cancelled");
                Err(SyncError::Cancelled)
            }
            Err(e) => {
                stats.failed_passes += 1;
                stats.last_error = Some(e.to_string());
                stats.last_failed_message = e.message_id();
                drop(stats);

                warn!(
                    error = %e,
                    message_id = ?e.message_id().map(|id| id.as_u64()),
                    "sync pass failed"
                );
                Err(e)
            }
        }
    }

    fn run_pass(&self) -> SyncResult<SyncReport> {
        let batch = self.store.list_pending_batch(self.batch_size);
        let mut report = SyncReport {
            attempted: batch.len(),
            ..SyncReport::default()
        };

        for message in &batch {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(SyncError::Cancelled);
            }

            let entry = MirrorEntry::from(message);
            let remote_ref = self
                .mirror
                .commit(&entry)
                .map_err(|source| SyncError::Mirror {
                    message_id: message.id,
                    source,
                })?;

            match self.store.mark_synced(message.id, remote_ref.as_str()) {
                Ok(_) => {
                    debug!(message_id = %message.id, remote_ref = %remote_ref, "message synced");
                    report.synced.push(message.id);
                    self.stats.write().messages_synced += 1;
                }
                Err(CoreError::AlreadySynced { remote_ref: kept, .. }) => {
                    warn!(
                        message_id = %message.id,
                        kept = %kept,
                        discarded = %remote_ref,
                        "message was already synced, keeping the stored ref"
                    );
                    report.already_synced.push(message.id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(report)
    }
}

impl<M: RemoteMirror> std::fmt::Debug for SyncEngine<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("mirror", &self.mirror.describe())
            .field("batch_size", &self.batch_size)
            .field("in_flight", &self.pass_lock.is_locked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MirrorError;
    use crate::mirror::{MemoryMirror, RemoteRef};
    use bookchat_core::BoardConfig;
    use std::sync::mpsc;
    use std::thread;

    fn store_with(contents: &[&str]) -> Arc<MessageStore> {
        let store = MessageStore::open_in_memory(BoardConfig::default()).unwrap();
        for c in contents {
            store.create(*c).unwrap();
        }
        Arc::new(store)
    }

    #[test]
    fn pass_mirrors_in_creation_order() {
        let store = store_with(&["a", "b", "c"]);
        let engine = SyncEngine::new(Arc::clone(&store), MemoryMirror::new());

        let report = engine.sync_once().unwrap();
        assert_eq!(report.attempted, 3);
        assert_eq!(report.synced, [1, 2, 3].map(MessageId::new));
        assert_eq!(report.remaining, 0);
        assert_eq!(engine.mirror().committed_ids(), report.synced);

        for commit in engine.mirror().commits() {
            let stored = store.get(commit.entry.id).unwrap();
            assert_eq!(stored.remote_ref(), Some(commit.remote_ref.as_str()));
        }
    }

    #[test]
    fn empty_pass_is_a_noop() {
        let engine = SyncEngine::new(store_with(&[]), MemoryMirror::new());
        let report = engine.sync_once().unwrap();
        assert!(report.is_noop());
        assert_eq!(engine.mirror().attempts(), 0);
        assert!(engine.status().last_success_at.is_some());
    }

    #[test]
    fn failure_stops_pass_and_resumes_later() {
        let store = store_with(&["a", "b", "c"]);
        let engine = SyncEngine::new(Arc::clone(&store), MemoryMirror::failing_on(2));

        let err = engine.sync_once().unwrap_err();
        assert_eq!(err.message_id(), Some(MessageId::new(2)));
        assert!(store.get(MessageId::new(1)).unwrap().is_synced());
        assert!(!store.get(MessageId::new(2)).unwrap().is_synced());
        assert!(!store.get(MessageId::new(3)).unwrap().is_synced());

        let status = engine.status();
        assert_eq!(status.pending_count, 2);
        assert_eq!(status.last_failed_message, Some(MessageId::new(2)));
        assert!(status.last_error.is_some());
        assert_eq!(status.failed_passes, 1);

        let report = engine.sync_once().unwrap();
        assert_eq!(report.synced, [2, 3].map(MessageId::new));
        assert_eq!(store.pending_count(), 0);
        assert_eq!(engine.status().last_error, None);
        assert_eq!(engine.status().messages_synced, 3);
    }

    #[test]
    fn batch_size_limits_a_pass() {
        let store = store_with(&["a", "b", "c", "d", "e"]);
        let engine = SyncEngine::new(Arc::clone(&store), MemoryMirror::new()).with_batch_size(2);

        assert_eq!(engine.sync_once().unwrap().remaining, 3);
        assert_eq!(engine.sync_once().unwrap().remaining, 1);
        assert_eq!(engine.sync_once().unwrap().synced, [MessageId::new(5)]);
        assert_eq!(engine.status().passes, 3);
    }

    /// Marks the message synced behind the engine's back before
    /// returning, so the engine's own mark hits `AlreadySynced`.
    struct RacingMirror {
        store: Arc<MessageStore>,
    }

    impl RemoteMirror for RacingMirror {
        fn commit(&self, entry: &MirrorEntry) -> Result<RemoteRef, MirrorError> {
            self.store.mark_synced(entry.id, "first").unwrap();
            Ok(RemoteRef::new("second"))
        }

        fn describe(&self) -> String {
            "racing".into()
        }
    }

    #[test]
    fn already_synced_is_progress() {
        let store = store_with(&["a"]);
        let engine = SyncEngine::new(
            Arc::clone(&store),
            RacingMirror {
                store: Arc::clone(&store),
            },
        );

        let report = engine.sync_once().unwrap();
        assert_eq!(report.already_synced, [MessageId::new(1)]);
        assert!(report.synced.is_empty());
        assert_eq!(
            store.get(MessageId::new(1)).unwrap().remote_ref(),
            Some("first")
        );
        assert_eq!(engine.status().messages_synced, 0);
    }

    /// Blocks inside `commit` until released.
    struct GateMirror {
        entered: Mutex<Option<mpsc::Sender<()>>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl RemoteMirror for GateMirror {
        fn commit(&self, entry: &MirrorEntry) -> Result<RemoteRef, MirrorError> {
            if let Some(tx) = self.entered.lock().take() {
                tx.send(()).unwrap();
            }
            self.release.lock().recv().unwrap();
            Ok(RemoteRef::new(format!("ref-{}", entry.id)))
        }

        fn describe(&self) -> String {
            "gate".into()
        }
    }

    fn gated_engine(contents: &[&str]) -> (Arc<SyncEngine<GateMirror>>, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let mirror = GateMirror {
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(release_rx),
        };
        let engine = Arc::new(SyncEngine::new(store_with(contents), mirror));
        (engine, entered_rx, release_tx)
    }

    #[test]
    fn concurrent_pass_is_rejected() {
        let (engine, entered, release) = gated_engine(&["a"]);

        let worker = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.sync_once())
        };
        entered.recv().unwrap();

        assert!(engine.status().in_flight);
        assert!(matches!(engine.sync_once(), Err(SyncError::AlreadyRunning)));

        release.send(()).unwrap();
        let report = worker.join().unwrap().unwrap();
        assert_eq!(report.synced.len(), 1);
        assert!(!engine.status().in_flight);
        // The rejected call is not counted as a pass.
        assert_eq!(engine.status().passes, 1);
    }

    #[test]
    fn cancel_keeps_partial_progress() {
        let (engine, entered, release) = gated_engine(&["a", "b", "c"]);

        let worker = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.sync_once())
        };
        entered.recv().unwrap();
        engine.cancel_handle().cancel();
        release.send(()).unwrap();

        assert!(matches!(worker.join().unwrap(), Err(SyncError::Cancelled)));
        let store = engine.store();
        assert!(store.get(MessageId::new(1)).unwrap().is_synced());
        assert_eq!(store.pending_count(), 2);
        assert_eq!(engine.status().last_error, None);

        // The cancelled pass cleared the flag; the next one finishes the job.
        release.send(()).unwrap();
        release.send(()).unwrap();
        let report = engine.sync_once().unwrap();
        assert_eq!(report.synced, [2, 3].map(MessageId::new));
    }

    #[test]
    fn cancel_before_pass_starts_is_honoured() {
        let store = store_with(&["a", "b"]);
        let engine = SyncEngine::new(Arc::clone(&store), MemoryMirror::new());

        engine.cancel_handle().cancel();
        assert!(matches!(engine.sync_once(), Err(SyncError::Cancelled)));
        assert_eq!(engine.mirror().attempts(), 0);
        assert_eq!(store.pending_count(), 2);

        let report = engine.sync_once().unwrap();
        assert_eq!(report.synced.len(), 2);
        assert_eq!(engine.status().messages_synced, 2);
    }
}
