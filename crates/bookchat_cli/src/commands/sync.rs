//! Sync commands: one pass, status, and the scheduler loop.

use super::{open_store, print_json, MirrorArgs, OutputFormat};
use bookchat_core::{BoardConfig, Message, MessageId, StoreStatsSnapshot};
use bookchat_sync::{GitMirror, GitMirrorConfig, MirrorEntry, SyncEngine, SyncReport, SyncScheduler};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// A message a dry run would mirror.
#[derive(Debug, Serialize)]
pub struct PlannedCommit {
    /// Message id.
    pub id: MessageId,
    /// File the message would be written to, relative to the work tree.
    pub path: PathBuf,
    /// Commit subject.
    pub commit_message: String,
}

/// Board and mirror status.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Data directory.
    pub data_dir: PathBuf,
    /// Number of messages.
    pub messages: usize,
    /// Messages waiting to be mirrored.
    pub pending: usize,
    /// Newest message id.
    pub last_id: Option<MessageId>,
    /// Mirror work tree.
    pub mirror_dir: PathBuf,
    /// Push remote, if any.
    pub mirror_remote: Option<String>,
    /// Mirror branch.
    pub mirror_branch: String,
    /// Store counters since open.
    pub stats: StoreStatsSnapshot,
}

/// Runs one sync pass, or prints its plan with `dry_run`.
pub fn run_once(
    config: BoardConfig,
    mirror_args: &MirrorArgs,
    dry_run: bool,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let mirror_config = mirror_args.mirror_config()?;
    let batch_size = config.pending_batch_size;
    let store = Arc::new(open_store(config)?);

    if dry_run {
        let plan = plan_commits(&store.list_pending_batch(batch_size), &mirror_config);
        return print_plan(&plan, format);
    }

    let mirror = GitMirror::open(mirror_config)?;
    let engine = SyncEngine::new(store, mirror);
    let report = engine.sync_once()?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => println!("{}", format_report(&report)),
    }
    Ok(())
}

/// Prints store statistics and the effective mirror settings.
pub fn status(
    config: BoardConfig,
    mirror_args: &MirrorArgs,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let mirror_config = mirror_args.mirror_config()?;
    let data_dir = config.data_dir.clone();
    let store = open_store(config)?;

    let report = StatusReport {
        data_dir,
        messages: store.len(),
        pending: store.pending_count(),
        last_id: store.last_id(),
        mirror_dir: mirror_config.work_dir,
        mirror_remote: mirror_config.remote,
        mirror_branch: mirror_config.branch,
        stats: store.stats(),
    };

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => print_status(&report),
    }
    Ok(())
}

/// Runs the sync scheduler until Ctrl-C.
pub fn run_scheduler(
    config: BoardConfig,
    mirror_args: &MirrorArgs,
    interval_secs: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let interval = interval_secs.map_or(config.sync_interval, Duration::from_secs);
    if interval.is_zero() {
        return Err("sync interval must be at least one second".into());
    }

    let mirror = GitMirror::open(mirror_args.mirror_config()?)?;
    let store = Arc::new(open_store(config)?);
    let engine = Arc::new(SyncEngine::new(Arc::clone(&store), mirror));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let handle = SyncScheduler::spawn(Arc::clone(&engine), interval);
        tokio::signal::ctrl_c().await?;
        info!("shutting down sync scheduler");
        handle.shutdown().await?;
        Ok::<_, Box<dyn std::error::Error>>(())
    })?;

    let status = engine.status();
    info!(
        passes = status.passes,
        failed_passes = status.failed_passes,
        messages_synced = status.messages_synced,
        pending = status.pending_count,
        "sync scheduler stopped"
    );
    store.flush()?;
    Ok(())
}

fn plan_commits(
    pending: &[Message],
    mirror_config: &GitMirrorConfig,
) -> Vec<PlannedCommit> {
    pending
        .iter()
        .map(MirrorEntry::from)
        .map(|entry| PlannedCommit {
            id: entry.id,
            path: mirror_config.messages_dir.join(entry.file_name()),
            commit_message: entry.commit_message(),
        })
        .collect()
}

fn print_plan(plan: &[PlannedCommit], format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => print_json(plan)?,
        OutputFormat::Text if plan.is_empty() => println!("Nothing to sync"),
        OutputFormat::Text => {
            println!("Would mirror {} message(s):", plan.len());
            for commit in plan {
                println!("  {}  {}", commit.path.display(), commit.commit_message);
            }
        }
    }
    Ok(())
}

fn format_report(report: &SyncReport) -> String {
    if report.is_noop() {
        return "Nothing to sync".to_string();
    }
    let mut out = format!(
        "Synced {} of {} message(s) in {:.2?}",
        report.synced.len(),
        report.attempted,
        report.duration
    );
    if !report.already_synced.is_empty() {
        out.push_str(&format!(", {} already synced", report.already_synced.len()));
    }
    if report.remaining > 0 {
        out.push_str(&format!(", {} still pending", report.remaining));
    }
    out
}

fn print_status(report: &StatusReport) {
    println!("Board: {}", report.data_dir.display());
    println!("  Messages:         {}", report.messages);
    println!("  Pending:          {}", report.pending);
    match report.last_id {
        Some(id) => println!("  Last id:          {id}"),
        None => println!("  Last id:          -"),
    }
    println!("  Records replayed: {}", report.stats.records_replayed);
    if report.stats.torn_bytes_discarded > 0 {
        println!(
            "  Torn bytes discarded on open: {}",
            report.stats.torn_bytes_discarded
        );
    }
    println!();
    println!("Mirror: {}", report.mirror_dir.display());
    println!("  Branch: {}", report.mirror_branch);
    println!(
        "  Remote: {}",
        report.mirror_remote.as_deref().unwrap_or("(none, local commits only)")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookchat_core::MessageStore;

    #[test]
    fn plan_lists_pending_in_order() {
        let store = MessageStore::open_in_memory(BoardConfig::default()).unwrap();
        store.create("a").unwrap();
        store.create("b").unwrap();
        store.mark_synced(MessageId::new(1), "abc").unwrap();
        store.create("c").unwrap();

        let plan = plan_commits(&store.list_pending(), &GitMirrorConfig::new("/m"));
        let ids: Vec<_> = plan.iter().map(|c| c.id.as_u64()).collect();
        assert_eq!(ids, [2, 3]);
        assert_eq!(plan[0].path, PathBuf::from("messages/message_2.json"));
        assert_eq!(plan[1].commit_message, "Add message 3");
    }

    #[test]
    fn report_text() {
        assert_eq!(format_report(&SyncReport::default()), "Nothing to sync");

        let report = SyncReport {
            attempted: 3,
            synced: vec![MessageId::new(1), MessageId::new(2)],
            already_synced: vec![],
            remaining: 1,
            duration: Duration::from_millis(5),
        };
        let text = format_report(&report);
        assert!(text.starts_with("Synced 2 of 3 message(s)"));
        assert!(text.ends_with(", 1 still pending"));
    }
}
