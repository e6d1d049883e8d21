//! A scripted mirror for sync engine tests.

use bookchat_core::MessageId;
use bookchat_sync::{MemoryMirror, MirrorEntry, MirrorError, MirrorResult, RemoteMirror, RemoteRef};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// A mirror that fails on chosen commit attempts.
///
/// Attempts are numbered from 1 across the mirror's lifetime, so a plan
/// like `{2, 3}` fails the second and third `commit` calls no matter which
/// pass makes them. Successful commits are delegated to a [`MemoryMirror`].
#[derive(Debug, Default)]
pub struct ScriptedMirror {
    inner: MemoryMirror,
    fail_on: Mutex<BTreeSet<u64>>,
    offline: AtomicBool,
    attempts: AtomicU64,
    attempted: Mutex<Vec<MessageId>>,
}

impl ScriptedMirror {
    /// Creates a mirror that never fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mirror that fails on the given attempts.
    pub fn failing_on(attempts: impl IntoIterator<Item = u64>) -> Self {
        let mirror = Self::new();
        mirror.fail_on.lock().unwrap().extend(attempts);
        mirror
    }

    /// Adds an attempt number to fail on.
    pub fn fail_on(&self, attempt: u64) {
        self.fail_on.lock().unwrap().insert(attempt);
    }

    /// Makes every commit fail until set back to `false`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of `commit` calls so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Number of successful writes.
    pub fn writes(&self) -> usize {
        self.inner.commits().len()
    }

    /// Message ids of every `commit` call, failed ones included.
    pub fn attempted_ids(&self) -> Vec<MessageId> {
        self.attempted.lock().unwrap().clone()
    }

    /// Message ids of successful writes, in order.
    pub fn written_ids(&self) -> Vec<MessageId> {
        self.inner.committed_ids()
    }

    /// Returns the refs handed out, in order.
    pub fn written_refs(&self) -> Vec<RemoteRef> {
        self.inner
            .commits()
            .into_iter()
            .map(|c| c.remote_ref)
            .collect()
    }
}

impl RemoteMirror for ScriptedMirror {
    fn commit(&self, entry: &MirrorEntry) -> MirrorResult<RemoteRef> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.attempted.lock().unwrap().push(entry.id);

        if self.offline.load(Ordering::SeqCst) {
            return Err(MirrorError::Scripted(format!(
                "mirror offline at attempt {attempt}"
            )));
        }
        if self.fail_on.lock().unwrap().contains(&attempt) {
            return Err(MirrorError::Scripted(format!(
                "attempt {attempt} for message {}",
                entry.id
            )));
        }

        self.inner.commit(entry)
    }

    fn describe(&self) -> String {
        format!("scripted mirror ({} writes)", self.writes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64) -> MirrorEntry {
        MirrorEntry {
            id: MessageId::new(id),
            content: format!("m{id}"),
            created_at: Default::default(),
        }
    }

    #[test]
    fn test_fails_on_planned_attempts() {
        let mirror = ScriptedMirror::failing_on([2]);
        mirror.commit(&entry(1)).unwrap();
        assert!(mirror.commit(&entry(2)).is_err());
        mirror.commit(&entry(2)).unwrap();

        assert_eq!(mirror.attempts(), 3);
        assert_eq!(mirror.writes(), 2);
        assert_eq!(mirror.attempted_ids(), [1, 2, 2].map(MessageId::new));
        assert_eq!(mirror.written_ids(), [1, 2].map(MessageId::new));
    }

    #[test]
    fn test_offline() {
        let mirror = ScriptedMirror::new();
        mirror.set_offline(true);
        assert!(matches!(mirror.commit(&entry(1)), Err(MirrorError::Scripted(_))));
        mirror.set_offline(false);
        mirror.commit(&entry(1)).unwrap();
        assert_eq!(mirror.written_refs().len(), 1);
    }
}
