//! Periodic sync passes on a Tokio runtime.

use crate::engine::{CancelHandle, SyncEngine};
use crate::error::SyncError;
use crate::mirror::RemoteMirror;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Runs [`SyncEngine::sync_once`] on an interval.
///
/// The first pass runs immediately. Passes run on the blocking pool, one
/// at a time; ticks missed while a pass is running are skipped.
pub struct SyncScheduler;

impl SyncScheduler {
    /// Spawns the scheduler task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<M>(engine: Arc<SyncEngine<M>>, interval: Duration) -> SchedulerHandle
    where
        M: RemoteMirror + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let trigger = Arc::new(Notify::new());
        let cancel = engine.cancel_handle();

        let task = tokio::spawn(run(engine, interval, Arc::clone(&trigger), shutdown_rx));

        SchedulerHandle {
            shutdown: Some(shutdown_tx),
            trigger,
            cancel,
            task,
        }
    }
}

async fn run<M>(
    engine: Arc<SyncEngine<M>>,
    interval: Duration,
    trigger: Arc<Notify>,
    mut shutdown: oneshot::Receiver<()>,
) where
    M: RemoteMirror + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        interval_secs = interval.as_secs_f64(),
        mirror = %engine.mirror().describe(),
        "sync scheduler started"
    );

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
            _ = trigger.notified() => debug!("sync pass triggered"),
        }

        let pass_engine = Arc::clone(&engine);
        match tokio::task::spawn_blocking(move || pass_engine.sync_once()).await {
            Ok(Ok(_)) => {}
            Ok(Err(SyncError::AlreadyRunning)) => {
                debug!("skipping tick, a sync pass is already running");
            }
            // The engine has already logged the failure.
            Ok(Err(_)) => {}
            Err(e) => error!(error = %e, "sync pass panicked"),
        }
    }

    info!("sync scheduler stopped");
}

/// Controls a running [`SyncScheduler`].
pub struct SchedulerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    trigger: Arc<Notify>,
    cancel: CancelHandle,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Requests a pass now instead of at the next tick.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Returns true once the scheduler task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the scheduler, cancelling the pass in flight, and waits for
    /// the task to exit.
    ///
    /// # Errors
    ///
    /// Returns the task's [`JoinError`] if it panicked or was aborted.
    pub async fn shutdown(mut self) -> Result<(), JoinError> {
        self.cancel.cancel();
        if let Some(tx) = self.shutdown.take() {
            if tx.send(()).is_err() {
                warn!("sync scheduler already stopped");
            }
        }
        self.task.await
    }
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("finished", &self.task.is_finished())
            .finish_non_exhaustive()
    }
}
