//! Integration tests for the sync engine and mirrors.

use bookchat_core::{BoardConfig, ListQuery, MessageId, MessageStore};
use bookchat_sync::{
    git_available, GitMirror, GitMirrorConfig, MemoryMirror, MirrorEntry, MirrorError,
    RemoteMirror, SyncEngine, SyncError,
};
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

fn memory_store() -> Arc<MessageStore> {
    Arc::new(MessageStore::open_in_memory(BoardConfig::default()).unwrap())
}

fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git").arg("-C").arg(dir).args(args).output().unwrap();
    assert!(out.status.success(), "git {args:?}: {}", String::from_utf8_lossy(&out.stderr));
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

#[test]
fn post_then_sync_end_to_end() {
    let store = memory_store();
    for c in ["a", "b", "c"] {
        store.create(c).unwrap();
    }
    let engine = SyncEngine::new(Arc::clone(&store), MemoryMirror::new());

    let report = engine.sync_once().unwrap();
    assert_eq!(report.synced.len(), 3);

    let listed = store.list(ListQuery::new());
    let contents: Vec<_> = listed.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["c", "b", "a"]);
    assert!(listed.iter().all(|m| m.is_synced()));

    let commits = engine.mirror().commits();
    let mirrored: Vec<_> = commits.iter().map(|c| c.entry.content.as_str()).collect();
    assert_eq!(mirrored, ["a", "b", "c"]);
}

#[test]
fn failure_on_second_write_then_recovery() {
    let store = memory_store();
    for c in ["a", "b", "c"] {
        store.create(c).unwrap();
    }
    let engine = SyncEngine::new(Arc::clone(&store), MemoryMirror::failing_on(2));

    match engine.sync_once() {
        Err(SyncError::Mirror { message_id, source }) => {
            assert_eq!(message_id, MessageId::new(2));
            assert!(matches!(source, MirrorError::Scripted(_)));
        }
        other => panic!("expected mirror failure, got {other:?}"),
    }

    let pending: Vec<_> = store.list_pending().into_iter().map(|m| m.content).collect();
    assert_eq!(pending, ["b", "c"]);

    let report = engine.sync_once().unwrap();
    assert_eq!(report.synced, [MessageId::new(2), MessageId::new(3)]);
    assert_eq!(store.pending_count(), 0);

    let ids = engine.mirror().committed_ids();
    assert_eq!(ids, [1, 2, 3].map(MessageId::new));
}

#[test]
fn synced_messages_are_not_mirrored_twice() {
    let store = memory_store();
    store.create("once").unwrap();
    let engine = SyncEngine::new(Arc::clone(&store), MemoryMirror::new());

    engine.sync_once().unwrap();
    engine.sync_once().unwrap();
    store.create("twice?").unwrap();
    engine.sync_once().unwrap();

    assert_eq!(engine.mirror().attempts(), 2);
}

#[test]
fn sync_survives_store_reopen() {
    let dir = TempDir::new().unwrap();
    let config = BoardConfig::new().data_dir(dir.path());
    let mirror = Arc::new(MemoryMirror::failing_on(2));

    {
        let store = Arc::new(MessageStore::open(config.clone()).unwrap());
        store.create("a").unwrap();
        store.create("b").unwrap();
        let engine = SyncEngine::new(store, Arc::clone(&mirror));
        engine.sync_once().unwrap_err();
    }

    let store = Arc::new(MessageStore::open(config).unwrap());
    assert_eq!(store.pending_count(), 1);
    let engine = SyncEngine::new(Arc::clone(&store), Arc::clone(&mirror));
    engine.sync_once().unwrap();

    let a = store.get(MessageId::new(1)).unwrap();
    let b = store.get(MessageId::new(2)).unwrap();
    let commits = mirror.commits();
    assert_eq!(a.remote_ref(), Some(commits[0].remote_ref.as_str()));
    assert_eq!(b.remote_ref(), Some(commits[1].remote_ref.as_str()));
}

#[test]
fn git_mirror_commits_each_message() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let work_dir = tmp.path().join("mirror");
    let mirror = GitMirror::open(
        GitMirrorConfig::new(&work_dir).with_author("Test Bot", "bot@example.com"),
    )
    .unwrap();

    let store = memory_store();
    for c in ["a", "b", "c"] {
        store.create(c).unwrap();
    }
    let engine = SyncEngine::new(Arc::clone(&store), mirror);
    engine.sync_once().unwrap();

    let log = git(&work_dir, &["log", "--format=%s", "--reverse"]);
    assert_eq!(log.lines().collect::<Vec<_>>(), ["Add message 1", "Add message 2", "Add message 3"]);
    assert_eq!(git(&work_dir, &["log", "-1", "--format=%an <%ae>"]), "Test Bot <bot@example.com>");

    let head = git(&work_dir, &["rev-parse", "HEAD"]);
    assert_eq!(store.get(MessageId::new(3)).unwrap().remote_ref(), Some(head.as_str()));

    let raw = std::fs::read_to_string(work_dir.join("messages").join("message_2.json")).unwrap();
    let entry: MirrorEntry = serde_json::from_str(&raw).unwrap();
    assert_eq!(entry.id, MessageId::new(2));
    assert_eq!(entry.content, "b");
}

#[test]
fn git_mirror_pushes_to_remote() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let remote = tmp.path().join("remote.git");
    let out = Command::new("git")
        .args(["init", "--bare", "--quiet"])
        .arg(&remote)
        .output()
        .unwrap();
    assert!(out.status.success());

    let work_dir = tmp.path().join("mirror");
    let mirror = GitMirror::open(
        GitMirrorConfig::new(&work_dir).with_remote(remote.to_string_lossy().into_owned()),
    )
    .unwrap();
    assert!(mirror.describe().contains("remote.git"));

    let store = memory_store();
    store.create("pushed").unwrap();
    let engine = SyncEngine::new(Arc::clone(&store), mirror);
    engine.sync_once().unwrap();

    let remote_head = git(&remote, &["rev-parse", "refs/heads/main"]);
    assert_eq!(
        store.get(MessageId::new(1)).unwrap().remote_ref(),
        Some(remote_head.as_str())
    );
}

#[test]
fn git_mirror_push_failure_keeps_message_pending() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("does-not-exist.git");
    let mirror = GitMirror::open(
        GitMirrorConfig::new(tmp.path().join("mirror"))
            .with_remote(missing.to_string_lossy().into_owned()),
    )
    .unwrap();

    let store = memory_store();
    store.create("stuck").unwrap();
    let engine = SyncEngine::new(Arc::clone(&store), mirror);

    match engine.sync_once() {
        Err(SyncError::Mirror { source, .. }) => {
            assert!(matches!(source, MirrorError::Push { .. }));
            assert!(source.is_retryable());
        }
        other => panic!("expected push failure, got {other:?}"),
    }
    assert_eq!(store.pending_count(), 1);
}

#[test]
fn git_mirror_retry_after_push_failure_commits_once() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let remote = tmp.path().join("late.git");
    let work_dir = tmp.path().join("mirror");
    let mirror = GitMirror::open(
        GitMirrorConfig::new(&work_dir).with_remote(remote.to_string_lossy().into_owned()),
    )
    .unwrap();

    let store = memory_store();
    store.create("retried").unwrap();
    let engine = SyncEngine::new(Arc::clone(&store), mirror);
    assert!(engine.sync_once().is_err());
    assert_eq!(store.pending_count(), 1);

    let out = Command::new("git")
        .args(["init", "--bare", "--quiet"])
        .arg(&remote)
        .output()
        .unwrap();
    assert!(out.status.success());

    engine.sync_once().unwrap();
    assert_eq!(store.pending_count(), 0);

    let subjects = git(&remote, &["log", "--format=%s", "main"]);
    assert_eq!(subjects.lines().collect::<Vec<_>>(), ["Add message 1"]);
    assert_eq!(git(&work_dir, &["rev-list", "--count", "HEAD"]), "1");

    let remote_head = git(&remote, &["rev-parse", "refs/heads/main"]);
    assert_eq!(
        store.get(MessageId::new(1)).unwrap().remote_ref(),
        Some(remote_head.as_str())
    );
}

#[test]
fn git_mirror_recommit_of_committed_message_returns_its_commit() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let mirror = GitMirror::open(GitMirrorConfig::new(tmp.path())).unwrap();
    let entry = MirrorEntry {
        id: MessageId::new(7),
        content: "same".into(),
        created_at: chrono::Utc::now(),
    };

    let first = mirror.commit(&entry).unwrap();
    let second = mirror.commit(&entry).unwrap();
    assert_eq!(first, second);
    assert_eq!(git(tmp.path(), &["rev-list", "--count", "HEAD"]), "1");
}

#[test]
fn git_mirror_parses_url_remote() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let mirror = GitMirror::open(
        GitMirrorConfig::new(tmp.path().join("url"))
            .with_remote("https://github.com/bookchat/board-backup.git"),
    )
    .unwrap();
    let url = mirror.remote_url().unwrap();
    assert_eq!(url.host, "github.com");
    assert_eq!(url.owner, "bookchat");
    assert_eq!(url.repo, "board-backup");

    let local = GitMirror::open(GitMirrorConfig::new(tmp.path().join("local"))).unwrap();
    assert!(local.remote_url().is_none());
}

#[test]
fn git_mirror_rejects_unknown_remote_name() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let result = GitMirror::open(GitMirrorConfig::new(tmp.path()).with_remote("upstream"));
    assert!(matches!(result, Err(MirrorError::InvalidRemote(_))));
}
