//! Per-session scheduler
//!
//! One task owns every periodic concern a session has and multiplexes the
//! resulting ticks into the session command loop. The session never runs
//! free timers of its own; stopping the scheduler stops all periodic work
//! at once during teardown.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tracing::debug;

use coedit_core::config::CoeditConfig;

/// Periodic work items delivered into the session loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Re-announce presence and let roster drift correct itself.
    PresenceReconcile,
    /// Check whether the initial-sync handshake has run out of time.
    SyncDeadline,
}

pub struct Scheduler {
    shutdown: watch::Sender<bool>,
}

impl Scheduler {
    /// Spawn the scheduler task feeding ticks into `ticks`.
    pub fn start(config: &CoeditConfig, ticks: mpsc::Sender<Tick>) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let reconcile_every = config.presence.reconcile_interval;
        // The deadline check is edge-triggered and cheap; poll it a few
        // times per sync window so the timeout lands close to configured.
        let sync_check_every = (config.engine.sync_wait / 4).max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut reconcile = interval(reconcile_every);
            let mut sync_check = interval(sync_check_every);
            // The first tick of an interval fires immediately; skip it.
            reconcile.tick().await;
            sync_check.tick().await;

            loop {
                let tick = tokio::select! {
                    _ = reconcile.tick() => Tick::PresenceReconcile,
                    _ = sync_check.tick() => Tick::SyncDeadline,
                    _ = shutdown_rx.changed() => break,
                };
                if ticks.send(tick).await.is_err() {
                    break;
                }
            }
            debug!("scheduler stopped");
        });

        Self {
            shutdown: shutdown_tx,
        }
    }

    /// Stop all periodic work.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_emits_both_tick_kinds() {
        let (tx, mut rx) = mpsc::channel(32);
        let scheduler = Scheduler::start(&CoeditConfig::testing(), tx);

        let mut saw_reconcile = false;
        let mut saw_deadline = false;
        while !(saw_reconcile && saw_deadline) {
            match timeout(Duration::from_millis(500), rx.recv()).await {
                Ok(Some(Tick::PresenceReconcile)) => saw_reconcile = true,
                Ok(Some(Tick::SyncDeadline)) => saw_deadline = true,
                other => panic!("scheduler went quiet: {other:?}"),
            }
        }
        scheduler.stop();
    }

    #[tokio::test]
    async fn test_stop_ends_ticks() {
        let (tx, mut rx) = mpsc::channel(32);
        let scheduler = Scheduler::start(&CoeditConfig::testing(), tx);
        scheduler.stop();

        // Drain whatever was in flight; the channel must then close.
        while let Some(_tick) = rx.recv().await {}
    }
}
