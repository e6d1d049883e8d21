//! CLI command implementations.

pub mod messages;
pub mod sync;

use bookchat_core::{BoardConfig, Message, MessageStore, SyncState};
use bookchat_sync::GitMirrorConfig;
use clap::{Args, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// How command results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Flags overriding the `BOOKCHAT_MIRROR_*` settings.
#[derive(Debug, Clone, Default, Args)]
pub struct MirrorArgs {
    /// Git work tree to mirror into (overrides BOOKCHAT_MIRROR_DIR)
    #[arg(long)]
    pub mirror_dir: Option<PathBuf>,

    /// Remote name or URL to push to (overrides BOOKCHAT_MIRROR_REMOTE)
    #[arg(long)]
    pub remote: Option<String>,

    /// Branch to commit on (overrides BOOKCHAT_MIRROR_BRANCH)
    #[arg(long)]
    pub branch: Option<String>,
}

impl MirrorArgs {
    /// Applies the flags on top of `config`.
    pub fn apply(&self, mut config: GitMirrorConfig) -> GitMirrorConfig {
        if let Some(dir) = &self.mirror_dir {
            config.work_dir = dir.clone();
        }
        if let Some(remote) = &self.remote {
            config.remote = (!remote.trim().is_empty()).then(|| remote.clone());
        }
        if let Some(branch) = &self.branch {
            config.branch = branch.clone();
        }
        config
    }

    /// Reads the mirror configuration from the environment and applies the flags.
    pub fn mirror_config(&self) -> Result<GitMirrorConfig, Box<dyn std::error::Error>> {
        let config = self.apply(GitMirrorConfig::from_env()?);
        config.validate()?;
        Ok(config)
    }
}

/// Reads the board configuration from the environment, then applies
/// `--data-dir`.
pub fn board_config(data_dir: Option<&Path>) -> Result<BoardConfig, Box<dyn std::error::Error>> {
    let mut config = BoardConfig::from_env()?;
    if let Some(dir) = data_dir {
        config = config.data_dir(dir);
    }
    Ok(config)
}

/// Opens the board's store.
pub fn open_store(config: BoardConfig) -> Result<MessageStore, Box<dyn std::error::Error>> {
    Ok(MessageStore::open(config)?)
}

/// Prints `value` as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One line per message: id, time, sync state and text.
pub fn format_message_line(message: &Message) -> String {
    format!(
        "#{:<5} {}  {:<16} {}",
        message.id,
        message.created_at.format("%Y-%m-%d %H:%M:%S"),
        format_sync_state(&message.sync_state),
        first_line(&message.content)
    )
}

/// `pending`, or `synced <short ref>`.
pub fn format_sync_state(state: &SyncState) -> String {
    match state {
        SyncState::Pending => "pending".to_string(),
        SyncState::Synced { remote_ref, .. } => format!("synced {}", short_ref(remote_ref)),
    }
}

/// The first 7 characters of a ref, like `git log --oneline`.
pub fn short_ref(remote_ref: &str) -> &str {
    match remote_ref.char_indices().nth(7) {
        Some((end, _)) => &remote_ref[..end],
        None => remote_ref,
    }
}

fn first_line(content: &str) -> String {
    let mut lines = content.lines();
    let first = lines.next().unwrap_or_default();
    if lines.next().is_some() {
        format!("{first} ...")
    } else {
        first.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookchat_core::MessageId;
    use chrono::{TimeZone, Utc};

    fn message(content: &str, state: SyncState) -> Message {
        Message {
            id: MessageId::new(12),
            content: content.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            sync_state: state,
        }
    }

    #[test]
    fn short_ref_truncates() {
        assert_eq!(short_ref("0123456789abcdef"), "0123456");
        assert_eq!(short_ref("abc"), "abc");
    }

    #[test]
    fn message_line_pending() {
        let line = format_message_line(&message("hello", SyncState::Pending));
        assert!(line.starts_with("#12"));
        assert!(line.contains("2024-03-01 09:30:00"));
        assert!(line.contains("pending"));
        assert!(line.ends_with("hello"));
    }

    #[test]
    fn message_line_synced_multiline() {
        let state = SyncState::Synced {
            remote_ref: "deadbeefcafe".into(),
            synced_at: Utc::now(),
        };
        let line = format_message_line(&message("first\nsecond", state));
        assert!(line.contains("synced deadbee"));
        assert!(line.ends_with("first ..."));
    }

    #[test]
    fn mirror_args_override_config() {
        let args = MirrorArgs {
            mirror_dir: Some(PathBuf::from("/srv/m")),
            remote: Some("origin".into()),
            branch: Some("backup".into()),
        };
        let config = args.apply(GitMirrorConfig::new("/elsewhere"));
        assert_eq!(config.work_dir, PathBuf::from("/srv/m"));
        assert_eq!(config.remote.as_deref(), Some("origin"));
        assert_eq!(config.branch, "backup");
    }

    #[test]
    fn empty_remote_flag_disables_push() {
        let args = MirrorArgs {
            remote: Some(String::new()),
            ..MirrorArgs::default()
        };
        let config = args.apply(GitMirrorConfig::new("/m").with_remote("origin"));
        assert!(config.remote.is_none());
    }
}
