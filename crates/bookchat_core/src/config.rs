//! Board configuration.

use crate::error::{CoreError, CoreResult};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable for [`BoardConfig::data_dir`].
pub const ENV_DATA_DIR: &str = "BOOKCHAT_DATA_DIR";
/// Environment variable for [`BoardConfig::max_message_length`].
pub const ENV_MAX_MESSAGE_LENGTH: &str = "BOOKCHAT_MAX_MESSAGE_LENGTH";
/// Environment variable for [`BoardConfig::default_list_limit`].
pub const ENV_DEFAULT_LIST_LIMIT: &str = "BOOKCHAT_DEFAULT_LIST_LIMIT";
/// Environment variable for [`BoardConfig::max_list_limit`].
pub const ENV_MAX_LIST_LIMIT: &str = "BOOKCHAT_MAX_LIST_LIMIT";
/// Environment variable for [`BoardConfig::sync_on_write`].
pub const ENV_SYNC_ON_WRITE: &str = "BOOKCHAT_SYNC_ON_WRITE";
/// Environment variable for [`BoardConfig::sync_interval`], in seconds.
pub const ENV_SYNC_INTERVAL_SECS: &str = "BOOKCHAT_SYNC_INTERVAL_SECS";
/// Environment variable for [`BoardConfig::pending_batch_size`].
pub const ENV_PENDING_BATCH_SIZE: &str = "BOOKCHAT_PENDING_BATCH_SIZE";

/// Everything a board can be configured with.
///
/// Built once at startup, checked with [`BoardConfig::validate`], then
/// handed to the store and the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardConfig {
    /// Directory holding `messages.log` and the `LOCK` file.
    pub data_dir: PathBuf,

    /// Longest accepted message, in characters.
    pub max_message_length: usize,

    /// Page size when a listing does not ask for one.
    pub default_list_limit: usize,

    /// Largest page a listing may return.
    pub max_list_limit: usize,

    /// Whether every write is fsynced before it is acknowledged.
    pub sync_on_write: bool,

    /// How often the scheduler runs a sync pass.
    pub sync_interval: Duration,

    /// Most pending messages mirrored per pass (0 = all of them).
    pub pending_batch_size: usize,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("bookchat-data"),
            max_message_length: 1000,
            default_list_limit: 50,
            max_list_limit: 500,
            sync_on_write: true,
            sync_interval: Duration::from_secs(30),
            pending_batch_size: 100,
        }
    }
}

impl BoardConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the data directory.
    #[must_use]
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Sets the maximum message length.
    #[must_use]
    pub const fn max_message_length(mut self, len: usize) -> Self {
        self.max_message_length = len;
        self
    }

    /// Sets the default page size.
    #[must_use]
    pub const fn default_list_limit(mut self, limit: usize) -> Self {
        self.default_list_limit = limit;
        self
    }

    /// Sets the maximum page size.
    #[must_use]
    pub const fn max_list_limit(mut self, limit: usize) -> Self {
        self.max_list_limit = limit;
        self
    }

    /// Sets whether writes are fsynced.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the sync interval.
    #[must_use]
    pub const fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the pending batch size.
    #[must_use]
    pub const fn pending_batch_size(mut self, size: usize) -> Self {
        self.pending_batch_size = size;
        self
    }

    /// Checks that the options are usable together.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] naming the first bad option.
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_message_length == 0 {
            return Err(CoreError::config("max_message_length must be at least 1"));
        }
        if self.default_list_limit == 0 {
            return Err(CoreError::config("default_list_limit must be at least 1"));
        }
        if self.default_list_limit > self.max_list_limit {
            return Err(CoreError::config(format!(
                "default_list_limit ({}) exceeds max_list_limit ({})",
                self.default_list_limit, self.max_list_limit
            )));
        }
        if self.sync_interval.is_zero() {
            return Err(CoreError::config("sync_interval must be non-zero"));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(CoreError::config("data_dir must not be empty"));
        }
        Ok(())
    }

    /// Builds a configuration from `BOOKCHAT_*` environment variables,
    /// falling back to defaults for unset ones, and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] if a variable cannot be parsed or the
    /// result fails [`BoardConfig::validate`].
    pub fn from_env() -> CoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`BoardConfig::from_env`], reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`BoardConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup(ENV_DATA_DIR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, ENV_MAX_MESSAGE_LENGTH)? {
            config.max_message_length = v;
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, ENV_DEFAULT_LIST_LIMIT)? {
            config.default_list_limit = v;
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, ENV_MAX_LIST_LIMIT)? {
            config.max_list_limit = v;
        }
        if let Some(raw) = lookup(ENV_SYNC_ON_WRITE) {
            config.sync_on_write = parse_bool(ENV_SYNC_ON_WRITE, &raw)?;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_SYNC_INTERVAL_SECS)? {
            config.sync_interval = Duration::from_secs(secs);
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, ENV_PENDING_BATCH_SIZE)? {
            config.pending_batch_size = v;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> CoreResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| CoreError::config(format!("{key}={raw:?}: {e}"))),
    }
}

fn parse_bool(key: &str, raw: &str) -> CoreResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CoreError::config(format!(
            "{key}={raw:?}: expected true or false"
        ))),
    }
}
