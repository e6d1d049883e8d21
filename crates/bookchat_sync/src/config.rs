//! Configuration for the Git mirror.

use crate::error::{MirrorError, MirrorResult};
use std::path::{Component, PathBuf};

/// Environment variable for [`GitMirrorConfig::work_dir`].
pub const ENV_MIRROR_DIR: &str = "BOOKCHAT_MIRROR_DIR";
/// Environment variable for [`GitMirrorConfig::remote`].
pub const ENV_MIRROR_REMOTE: &str = "BOOKCHAT_MIRROR_REMOTE";
/// Environment variable for [`GitMirrorConfig::branch`].
pub const ENV_MIRROR_BRANCH: &str = "BOOKCHAT_MIRROR_BRANCH";
/// Environment variable for [`GitMirrorConfig::author_name`].
pub const ENV_MIRROR_AUTHOR_NAME: &str = "BOOKCHAT_MIRROR_AUTHOR_NAME";
/// Environment variable for [`GitMirrorConfig::author_email`].
pub const ENV_MIRROR_AUTHOR_EMAIL: &str = "BOOKCHAT_MIRROR_AUTHOR_EMAIL";

/// Configuration for a [`crate::GitMirror`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitMirrorConfig {
    /// Git work tree the mirror commits into.
    pub work_dir: PathBuf,
    /// Directory for message files, relative to `work_dir`.
    pub messages_dir: PathBuf,
    /// Remote to push to after each commit: a remote name such as
    /// `origin` or a repository URL. No push when `None`.
    pub remote: Option<String>,
    /// Branch to commit on and push to.
    pub branch: String,
    /// Author and committer name.
    pub author_name: String,
    /// Author and committer email.
    pub author_email: String,
    /// Run `git init` when `work_dir` is not a repository yet.
    pub init_if_missing: bool,
}

impl GitMirrorConfig {
    /// Creates a configuration for the given work tree.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            messages_dir: PathBuf::from("messages"),
            remote: None,
            branch: "main".into(),
            author_name: "BookChat".into(),
            author_email: "bookchat@localhost".into(),
            init_if_missing: true,
        }
    }

    /// Sets the messages directory.
    pub fn with_messages_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.messages_dir = dir.into();
        self
    }

    /// Sets the push remote.
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = Some(remote.into());
        self
    }

    /// Sets the branch.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Sets the commit author.
    pub fn with_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author_name = name.into();
        self.author_email = email.into();
        self
    }

    /// Sets whether a missing repository is initialised.
    pub fn with_init_if_missing(mut self, init: bool) -> Self {
        self.init_if_missing = init;
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> MirrorResult<()> {
        if self.work_dir.as_os_str().is_empty() {
            return Err(MirrorError::InvalidConfig("work_dir must not be empty".into()));
        }
        if self.messages_dir.as_os_str().is_empty()
            || !self
                .messages_dir
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(MirrorError::InvalidConfig(format!(
                "messages_dir must be a relative path inside the work tree, got {}",
                self.messages_dir.display()
            )));
        }
        if self.branch.trim().is_empty() || self.branch.contains(char::is_whitespace) {
            return Err(MirrorError::InvalidConfig(format!(
                "invalid branch name {:?}",
                self.branch
            )));
        }
        if self.author_name.trim().is_empty() || self.author_email.trim().is_empty() {
            return Err(MirrorError::InvalidConfig(
                "author name and email must not be empty".into(),
            ));
        }
        if let Some(remote) = &self.remote {
            if remote.trim().is_empty() {
                return Err(MirrorError::InvalidRemote("remote must not be empty".into()));
            }
        }
        Ok(())
    }

    /// Builds a configuration from `BOOKCHAT_MIRROR_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns the [`GitMirrorConfig::validate`] error for bad values.
    pub fn from_env() -> MirrorResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`GitMirrorConfig::from_env`], reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`GitMirrorConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> MirrorResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let work_dir = lookup(ENV_MIRROR_DIR).unwrap_or_else(|| "bookchat-mirror".into());
        let mut config = Self::new(work_dir);

        if let Some(remote) = lookup(ENV_MIRROR_REMOTE).filter(|r| !r.trim().is_empty()) {
            config.remote = Some(remote);
        }
        if let Some(branch) = lookup(ENV_MIRROR_BRANCH) {
            config.branch = branch;
        }
        if let Some(name) = lookup(ENV_MIRROR_AUTHOR_NAME) {
            config.author_name = name;
        }
        if let Some(email) = lookup(ENV_MIRROR_AUTHOR_EMAIL) {
            config.author_email = email;
        }

        config.validate()?;
        Ok(config)
    }
}
