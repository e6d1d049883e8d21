//! Test fixtures and store helpers.

use bookchat_core::{BoardConfig, Message, MessageStore};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store.
    pub store: Arc<MessageStore>,
    config: BoardConfig,
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates an in-memory store with default configuration.
    pub fn memory() -> Self {
        Self::memory_with(BoardConfig::default())
    }

    /// Creates an in-memory store with the given configuration.
    pub fn memory_with(config: BoardConfig) -> Self {
        let store = MessageStore::open_in_memory(config.clone())
            .expect("Failed to open in-memory store");
        Self {
            store: Arc::new(store),
            config,
            _temp_dir: None,
        }
    }

    /// Creates a store in a fresh temporary directory.
    pub fn file() -> Self {
        Self::file_with(BoardConfig::default())
    }

    /// Creates a store in a fresh temporary directory. `config.data_dir`
    /// is replaced by the temporary directory.
    pub fn file_with(config: BoardConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = config.data_dir(temp_dir.path().join("board"));
        let store = MessageStore::open(config.clone()).expect("Failed to open file store");
        Self {
            store: Arc::new(store),
            config,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Closes and reopens a file store, replaying its log.
    ///
    /// Panics for in-memory stores, or if another `Arc` to the store is
    /// still alive (the directory lock would still be held).
    pub fn reopen(self) -> Self {
        let Self {
            store,
            config,
            _temp_dir: temp_dir,
        } = self;
        assert!(temp_dir.is_some(), "only file stores can be reopened");
        assert_eq!(
            Arc::strong_count(&store),
            1,
            "store still shared, drop other handles before reopening"
        );
        drop(store);

        let store = MessageStore::open(config.clone()).expect("Failed to reopen file store");
        Self {
            store: Arc::new(store),
            config,
            _temp_dir: temp_dir,
        }
    }

    /// Returns a shared handle, e.g. for a sync engine.
    pub fn shared(&self) -> Arc<MessageStore> {
        Arc::clone(&self.store)
    }

    /// Returns the data directory for file stores.
    pub fn path(&self) -> Option<&Path> {
        self._temp_dir.as_ref().map(|_| self.config.data_dir.as_path())
    }

    /// Returns the configuration the store was opened with.
    pub fn config(&self) -> &BoardConfig {
        &self.config
    }
}

impl std::ops::Deref for TestStore {
    type Target = MessageStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a temporary in-memory store.
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&MessageStore) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Runs a test with a store in a temporary directory.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&MessageStore, &Path) -> R,
{
    let test_store = TestStore::file();
    let path = test_store
        .path()
        .expect("File store should have a path")
        .to_path_buf();
    f(&test_store.store, &path)
}

/// A board state to set up before a test.
///
/// Steps run in the order they were added.
#[derive(Debug, Clone, Default)]
pub struct BoardScenario {
    steps: Vec<Step>,
}

#[derive(Debug, Clone)]
enum Step {
    Post(String),
    Sync { index: usize, remote_ref: String },
}

impl BoardScenario {
    /// Starts an empty scenario.
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts a message.
    pub fn post(mut self, content: impl Into<String>) -> Self {
        self.steps.push(Step::Post(content.into()));
        self
    }

    /// Posts several messages in order.
    pub fn posts<I, S>(mut self, contents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps
            .extend(contents.into_iter().map(|c| Step::Post(c.into())));
        self
    }

    /// Marks the `index`-th posted message (0-based) synced.
    pub fn synced(mut self, index: usize, remote_ref: impl Into<String>) -> Self {
        self.steps.push(Step::Sync {
            index,
            remote_ref: remote_ref.into(),
        });
        self
    }

    /// Applies the scenario and returns the posted messages in their
    /// final state, oldest first.
    pub fn apply(&self, store: &MessageStore) -> Vec<Message> {
        let mut posted: Vec<Message> = Vec::new();
        for step in &self.steps {
            match step {
                Step::Post(content) => {
                    posted.push(store.create(content.clone()).expect("Failed to post message"));
                }
                Step::Sync { index, remote_ref } => {
                    let message = posted
                        .get_mut(*index)
                        .expect("Scenario syncs a message that was not posted yet");
                    *message = store
                        .mark_synced(message.id, remote_ref.clone())
                        .expect("Failed to mark message synced");
                }
            }
        }
        posted
    }

    /// Applies the scenario to a new in-memory store.
    pub fn build(&self) -> (TestStore, Vec<Message>) {
        let store = TestStore::memory();
        let messages = self.apply(&store);
        (store, messages)
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// A store holding `count` pending messages `message 1..=count`.
    pub fn populated_board(count: usize) -> TestStore {
        let store = TestStore::memory();
        for i in 1..=count {
            store
                .create(format!("message {i}"))
                .expect("Failed to post message");
        }
        store
    }

    /// The a/b/c board used by end-to-end tests, all pending.
    pub fn abc_board() -> (TestStore, Vec<Message>) {
        BoardScenario::new().posts(["a", "b", "c"]).build()
    }
}
