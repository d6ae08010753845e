//! Scheduler - session-driven triggers
//!
//! One loop watches the session edges: matchmaking is toggled when the
//! market opens or pauses, and the close event fires once after the final
//! window ends. A second loop runs the in-session asset sync. An advisory
//! lockfile keeps the timers on a single process when several instances
//! share a host.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::SchedulerConfig;
use crate::main_engine::MainEngine;
use crate::session::TradingSession;

/// Advisory cross-process lock. Held while the owning process runs the
/// timers; the file is removed on drop.
pub struct JobsLock {
    path: PathBuf,
}

impl JobsLock {
    /// Try to take the lock. `Ok(None)` means another process holds it.
    pub fn try_acquire(path: impl AsRef<Path>) -> io::Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Some(Self { path })),
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(error) => Err(error),
        }
    }
}

impl Drop for JobsLock {
    fn drop(&mut self) {
        if let Err(error) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), %error, "jobs lockfile not removed");
        }
    }
}

pub struct Scheduler {
    engine: Arc<MainEngine>,
    session: TradingSession,
    config: SchedulerConfig,
    _lock: JobsLock,
}

impl Scheduler {
    /// Build the scheduler if this process wins the jobs lock; `None`
    /// means another instance already runs the timers.
    pub fn with_lock(
        engine: Arc<MainEngine>,
        session: TradingSession,
        config: SchedulerConfig,
    ) -> io::Result<Option<Self>> {
        let Some(lock) = JobsLock::try_acquire(&config.jobs_lock_path)? else {
            info!(
                path = %config.jobs_lock_path,
                "jobs lock held elsewhere, timers disabled on this instance"
            );
            return Ok(None);
        };
        Ok(Some(Self {
            engine,
            session,
            config,
            _lock: lock,
        }))
    }

    /// Spawn the timer loops. The returned handle owns the lockfile; abort
    /// it to stop the timers.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let session_edges = self.session_edges();
            let asset_sync = self.asset_sync();
            tokio::join!(session_edges, asset_sync);
        })
    }

    /// Toggle matchmaking on session edges and fire market-close once the
    /// final window of the day ends.
    async fn session_edges(&self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.tick_secs.max(1)));
        let mut was_trading = self.session.is_trading_time();
        loop {
            interval.tick().await;
            let is_trading = self.session.is_trading_time();
            if is_trading && !was_trading {
                info!("trading session opened");
                self.engine.market_engine.start_matchmaking();
            }
            if !is_trading && was_trading {
                info!("trading session paused");
                self.engine.market_engine.stop_matchmaking().await;
                if self.session.is_after_close(Utc::now()) {
                    info!("trading session closed, firing market close");
                    self.engine.trigger_market_close();
                }
            }
            was_trading = is_trading;
        }
    }

    /// Periodic in-session mark of positions, profit, and daily records.
    async fn asset_sync(&self) {
        let period = Duration::from_secs(self.config.sync_user_assets_secs.max(1));
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if !self.session.is_trading_time() {
                continue;
            }
            if let Err(error) = self.engine.trigger_sync_user_assets().await {
                warn!(%error, "user asset sync failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jobs_lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.lock");

        let first = JobsLock::try_acquire(&path).unwrap();
        assert!(first.is_some());
        assert!(JobsLock::try_acquire(&path).unwrap().is_none());

        drop(first);
        assert!(JobsLock::try_acquire(&path).unwrap().is_some());
    }
}
