//! The message store.

use crate::config::BoardConfig;
use crate::dir::StoreDir;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::record::LogRecord;
use crate::stats::{StoreStats, StoreStatsSnapshot};
use crate::types::{ListLimit, ListQuery, Message, MessageId, SyncState};
use bookchat_storage::{FileBackend, InMemoryBackend, StorageBackend, StorageResult};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Durable, ordered store of board messages.
///
/// Every mutation is appended to the message log and made durable before
/// it becomes visible. On open the log is replayed to rebuild two in-memory
/// indexes: messages by id (the ordering key) and the set of pending ids
/// (the sync-state index).
///
/// # Concurrency
///
/// `create` and `mark_synced` are serialized by the log mutex. Readers
/// only take the read side of the index lock, which a writer holds just
/// long enough to publish a record that is already on disk, so a reader
/// sees a message either before or after a transition and never in between.
pub struct MessageStore {
    config: BoardConfig,
    log: Mutex<Box<dyn StorageBackend>>,
    state: RwLock<StoreState>,
    stats: StoreStats,
    dir: Option<StoreDir>,
}

#[derive(Debug, Default)]
struct StoreState {
    messages: BTreeMap<MessageId, Message>,
    pending: BTreeSet<MessageId>,
    last_id: MessageId,
    last_created_at: Option<DateTime<Utc>>,
}

impl StoreState {
    fn apply(&mut self, record: LogRecord, offset: u64) -> CoreResult<()> {
        match record {
            LogRecord::Created {
                id,
                content,
                created_at,
            } => {
                if id <= self.last_id {
                    return Err(CoreError::corruption(
                        offset,
                        format!("message id {id} does not follow {}", self.last_id),
                    ));
                }
                self.insert_created(Message {
                    id,
                    content,
                    created_at,
                    sync_state: SyncState::Pending,
                });
                Ok(())
            }
            LogRecord::Synced {
                id,
                remote_ref,
                synced_at,
            } => match self.messages.get(&id) {
                None => Err(CoreError::corruption(
                    offset,
                    format!("sync mark for unknown message {id}"),
                )),
                Some(message) if message.is_synced() => Err(CoreError::corruption(
                    offset,
                    format!("second sync mark for message {id}"),
                )),
                Some(_) => {
                    self.set_synced(id, remote_ref, synced_at);
                    Ok(())
                }
            },
        }
    }

    fn insert_created(&mut self, message: Message) {
        self.last_id = message.id;
        self.last_created_at = Some(message.created_at);
        self.pending.insert(message.id);
        self.messages.insert(message.id, message);
    }

    fn set_synced(
        &mut self,
        id: MessageId,
        remote_ref: String,
        synced_at: DateTime<Utc>,
    ) -> Option<Message> {
        let message = self.messages.get_mut(&id)?;
        message.sync_state = SyncState::Synced {
            remote_ref,
            synced_at,
        };
        self.pending.remove(&id);
        Some(message.clone())
    }
}

impl MessageStore {
    /// Opens the store in `config.data_dir`, creating it if needed, and
    /// replays its log.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Config`] if the configuration is invalid
    /// - [`CoreError::StoreLocked`] if another store owns the directory
    /// - corruption or storage errors from replay
    pub fn open(config: BoardConfig) -> CoreResult<Self> {
        config.validate()?;
        let dir = StoreDir::open(&config.data_dir)?;
        let backend = FileBackend::open(&dir.log_path())?;
        Self::open_inner(config, Box::new(backend), Some(dir))
    }

    /// Opens an empty store that lives only in memory.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] if the configuration is invalid.
    pub fn open_in_memory(config: BoardConfig) -> CoreResult<Self> {
        config.validate()?;
        Self::open_inner(config, Box::new(InMemoryBackend::new()), None)
    }

    /// Opens a store over an existing backend and replays it.
    ///
    /// `config.data_dir` is not used and no directory lock is taken.
    ///
    /// # Errors
    ///
    /// Same as [`MessageStore::open`], minus locking.
    pub fn open_with_backend(
        config: BoardConfig,
        backend: Box<dyn StorageBackend>,
    ) -> CoreResult<Self> {
        config.validate()?;
        Self::open_inner(config, backend, None)
    }

    fn open_inner(
        config: BoardConfig,
        mut backend: Box<dyn StorageBackend>,
        dir: Option<StoreDir>,
    ) -> CoreResult<Self> {
        let stats = StoreStats::new();
        let state = replay(backend.as_mut(), &stats)?;

        info!(
            messages = state.messages.len(),
            pending = state.pending.len(),
            last_id = %state.last_id,
            "message store opened"
        );

        Ok(Self {
            config,
            log: Mutex::new(backend),
            state: RwLock::new(state),
            stats,
            dir,
        })
    }

    /// Creates a message in the `Pending` state.
    ///
    /// The content is validated before anything is written. The returned
    /// message is already durable.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Validation`] for empty or over-long content
    /// - storage errors from the append; the store is unchanged in that case
    pub fn create(&self, content: impl Into<String>) -> CoreResult<Message> {
        let content = content.into();
        if let Err(e) = self.validate_content(&content) {
            self.stats.record_validation_failure();
            return Err(e.into());
        }

        let mut log = self.log.lock();

        let (id, created_at) = {
            let state = self.state.read();
            let now = Utc::now();
            // Keep created_at non-decreasing in id order even if the clock steps back.
            let created_at = match state.last_created_at {
                Some(last) if last > now => last,
                _ => now,
            };
            (state.last_id.next(), created_at)
        };

        let record = LogRecord::Created {
            id,
            content: content.clone(),
            created_at,
        };
        let written = self.append_durable(log.as_mut(), &record)?;

        let message = Message {
            id,
            content,
            created_at,
            sync_state: SyncState::Pending,
        };
        self.state.write().insert_created(message.clone());
        drop(log);

        self.stats.record_create(written);
        debug!(message_id = %id, "message created");
        Ok(message)
    }

    /// Marks a pending message as mirrored under `remote_ref`.
    ///
    /// Marking an already synced message is rejected with
    /// [`CoreError::AlreadySynced`] and changes nothing; the stored ref is
    /// never overwritten.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Validation`] if `remote_ref` is empty
    /// - [`CoreError::NotFound`] if there is no such message
    /// - [`CoreError::AlreadySynced`] if the message is already synced
    /// - storage errors from the append
    pub fn mark_synced(&self, id: MessageId, remote_ref: impl Into<String>) -> CoreResult<Message> {
        let remote_ref = remote_ref.into();
        if remote_ref.trim().is_empty() {
            self.stats.record_validation_failure();
            return Err(ValidationError::EmptyRemoteRef.into());
        }

        let mut log = self.log.lock();

        {
            let state = self.state.read();
            let message = state
                .messages
                .get(&id)
                .ok_or_else(|| CoreError::not_found(id))?;
            if let Some(existing) = message.remote_ref() {
                self.stats.record_already_synced();
                return Err(CoreError::AlreadySynced {
                    id,
                    remote_ref: existing.to_string(),
                });
            }
        }

        let synced_at = Utc::now();
        let record = LogRecord::Synced {
            id,
            remote_ref: remote_ref.clone(),
            synced_at,
        };
        let written = self.append_durable(log.as_mut(), &record)?;

        let message = self
            .state
            .write()
            .set_synced(id, remote_ref, synced_at)
            .ok_or_else(|| CoreError::not_found(id))?;
        drop(log);

        self.stats.record_sync_mark(written);
        debug!(message_id = %id, "message marked synced");
        Ok(message)
    }

    /// Returns one message.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if there is no such message.
    pub fn get(&self, id: MessageId) -> CoreResult<Message> {
        self.stats.record_read();
        self.state
            .read()
            .messages
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(id))
    }

    /// Returns messages newest first, skipping `query.offset` then taking
    /// at most the query's limit.
    pub fn list(&self, query: ListQuery) -> Vec<Message> {
        self.stats.record_read();
        let limit = self.effective_limit(query.limit);
        self.state
            .read()
            .messages
            .values()
            .rev()
            .skip(query.offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns messages with an id greater than `since`, oldest first.
    ///
    /// Meant for polling clients that remember the last id they saw.
    pub fn list_since(&self, since: MessageId, limit: ListLimit) -> Vec<Message> {
        self.stats.record_read();
        let limit = self.effective_limit(limit);
        self.state
            .read()
            .messages
            .range((Bound::Excluded(since), Bound::Unbounded))
            .map(|(_, message)| message.clone())
            .take(limit)
            .collect()
    }

    /// Returns every pending message, oldest first.
    pub fn list_pending(&self) -> Vec<Message> {
        self.list_pending_batch(0)
    }

    /// Returns the oldest `limit` pending messages (all of them for 0).
    pub fn list_pending_batch(&self, limit: usize) -> Vec<Message> {
        self.stats.record_read();
        let take = if limit == 0 { usize::MAX } else { limit };
        let state = self.state.read();
        state
            .pending
            .iter()
            .take(take)
            .filter_map(|id| state.messages.get(id).cloned())
            .collect()
    }

    /// Number of messages not yet mirrored.
    pub fn pending_count(&self) -> usize {
        self.state.read().pending.len()
    }

    /// Total number of messages.
    pub fn len(&self) -> usize {
        self.state.read().messages.len()
    }

    /// Returns true if the board has no messages.
    pub fn is_empty(&self) -> bool {
        self.state.read().messages.is_empty()
    }

    /// Id of the newest message, if any.
    pub fn last_id(&self) -> Option<MessageId> {
        let last = self.state.read().last_id;
        (last.as_u64() > 0).then_some(last)
    }

    /// Forces the log to stable storage.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the flush or sync fails.
    pub fn flush(&self) -> CoreResult<()> {
        let mut log = self.log.lock();
        log.flush()?;
        log.sync()?;
        Ok(())
    }

    /// Returns a snapshot of the store's counters.
    pub fn stats(&self) -> StoreStatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns the configuration the store was opened with.
    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    /// Returns the data directory, or `None` for stores without one.
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(StoreDir::path)
    }

    fn validate_content(&self, content: &str) -> Result<(), ValidationError> {
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyContent);
        }
        let len = content.chars().count();
        let max = self.config.max_message_length;
        if len > max {
            return Err(ValidationError::ContentTooLong { len, max });
        }
        Ok(())
    }

    fn effective_limit(&self, limit: ListLimit) -> usize {
        match limit {
            ListLimit::Default => self.config.default_list_limit,
            ListLimit::Count(n) => n.min(self.config.max_list_limit),
            ListLimit::Unbounded => usize::MAX,
        }
    }

    /// Appends one record and makes it durable. On failure the log is cut
    /// back to where it was so a half-written record cannot precede the
    /// next one.
    fn append_durable(&self, log: &mut dyn StorageBackend, record: &LogRecord) -> CoreResult<u64> {
        let bytes = record.encode()?;
        let start = log.size()?;

        if let Err(e) = write_record(log, &bytes, self.config.sync_on_write) {
            if let Err(rollback) = log.truncate(start) {
                error!(
                    message_id = %record.message_id(),
                    offset = start,
                    error = %rollback,
                    "failed to roll back partial record"
                );
            }
            return Err(e.into());
        }

        Ok(bytes.len() as u64)
    }
}

fn write_record(log: &mut dyn StorageBackend, bytes: &[u8], sync: bool) -> StorageResult<()> {
    log.append(bytes)?;
    log.flush()?;
    if sync {
        log.sync()?;
    }
    Ok(())
}

/// Rebuilds the indexes from the log.
///
/// A trailing record cut short by a crash is dropped and the log truncated
/// to the last complete record. Anything else that does not decode is
/// corruption and stops the open.
fn replay(log: &mut dyn StorageBackend, stats: &StoreStats) -> CoreResult<StoreState> {
    let size = log.size()?;
    let mut state = StoreState::default();
    let mut offset = 0u64;
    let mut records = 0u64;

    while offset < size {
        let remaining = size - offset;
        if remaining < 4 {
            break;
        }

        let prefix = log.read_at(offset, 4)?;
        let record_len = LogRecord::peek_len([prefix[0], prefix[1], prefix[2], prefix[3]]);
        if record_len < LogRecord::MIN_SIZE {
            return Err(CoreError::corruption(
                offset,
                format!("invalid record length {record_len}"),
            ));
        }
        if record_len as u64 > remaining {
            break;
        }

        let data = log.read_at(offset, record_len)?;
        let record = LogRecord::decode(&data, offset)?;
        state.apply(record, offset)?;

        offset += record_len as u64;
        records += 1;
    }

    let torn = size - offset;
    if torn > 0 {
        warn!(
            offset,
            torn_bytes = torn,
            "discarding incomplete record at end of message log"
        );
        log.truncate(offset)?;
        log.sync()?;
    }

    stats.record_replay(records, torn);
    Ok(state)
}

impl std::fmt::Debug for MessageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("MessageStore")
            .field("path", &self.path())
            .field("messages", &state.messages.len())
            .field("pending", &state.pending.len())
            .field("last_id", &state.last_id)
            .finish_non_exhaustive()
    }
}
