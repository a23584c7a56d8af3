//! Background eviction worker for expired cache entries.
//!
//! A single dedicated task purges expired rows in bounded batches. Each
//! tick deletes up to `batch_size` rows at a time, sleeping briefly
//! between batches, until a short batch signals the backlog is drained
//! or the iteration ceiling is hit. The first sweep runs immediately on
//! start so a long-running process accumulates no startup backlog.
//!
//! The worker's only synchronization with the foreground is the
//! database; a batched delete is safe to race against concurrent
//! upserts. On shutdown it finishes the current tick and exits.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use geotag_database::{DbError, address_cache};
use serde::Serialize;
use switchy_database::Database;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::EvictionConfig;

/// Ceiling on batches per periodic tick, bounding a single tick
/// regardless of backlog.
const MAX_ITERATIONS: u32 = 100;

/// Deadline for one periodic tick.
const TICK_DEADLINE: Duration = Duration::from_secs(5 * 60);

/// Pause between batches on the periodic path.
const BATCH_SLEEP: Duration = Duration::from_millis(100);

/// Pause between batches for manual [`run_once`] sweeps.
const RUN_ONCE_SLEEP: Duration = Duration::from_millis(50);

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvictionStats {
    /// Total rows deleted.
    pub deleted: u64,
    /// Batches executed.
    pub iterations: u32,
}

/// The periodic eviction worker.
pub struct EvictionWorker {
    db: Arc<dyn Database>,
    config: EvictionConfig,
}

/// Handle to a started worker; dropping it does not stop the task.
pub struct EvictionHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl EvictionHandle {
    /// Signals shutdown and waits for the worker to finish its current
    /// tick and exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            log::error!("eviction worker task panicked: {e}");
        }
    }
}

impl EvictionWorker {
    /// Creates a worker over the given database.
    #[must_use]
    pub const fn new(db: Arc<dyn Database>, config: EvictionConfig) -> Self {
        Self { db, config }
    }

    /// Spawns the worker task. The first sweep runs immediately; later
    /// sweeps run every `interval`.
    #[must_use]
    pub fn start(self) -> EvictionHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            log::info!(
                "cache eviction worker started (interval {:?}, batch size {})",
                self.config.interval,
                self.config.batch_size
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let sweep = sweep(
                            self.db.as_ref(),
                            self.config.batch_size,
                            BATCH_SLEEP,
                            Some(MAX_ITERATIONS),
                        );
                        match tokio::time::timeout(TICK_DEADLINE, sweep).await {
                            Ok(Ok(stats)) if stats.deleted > 0 => {
                                log::info!(
                                    "evicted {} expired cache entries in {} batches",
                                    stats.deleted,
                                    stats.iterations
                                );
                            }
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => log::error!("cache eviction sweep failed: {e}"),
                            Err(_) => log::warn!("cache eviction tick exceeded deadline"),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        log::info!("cache eviction worker stopping");
                        break;
                    }
                }
            }
        });

        EvictionHandle { shutdown, handle }
    }
}

/// Runs a single sweep to exhaustion, with no iteration ceiling. Used by
/// the manual cache-clear endpoint.
///
/// # Errors
///
/// Returns [`DbError`] if a delete batch fails.
pub async fn run_once(db: &dyn Database, batch_size: u32) -> Result<EvictionStats, DbError> {
    sweep(db, batch_size, RUN_ONCE_SLEEP, None).await
}

async fn sweep(
    db: &dyn Database,
    batch_size: u32,
    pause: Duration,
    max_iterations: Option<u32>,
) -> Result<EvictionStats, DbError> {
    let mut stats = EvictionStats::default();

    loop {
        let now = Utc::now().naive_utc();
        let deleted = address_cache::delete_expired(db, now, batch_size).await?;
        stats.deleted += deleted;
        stats.iterations += 1;

        if deleted < u64::from(batch_size) {
            break;
        }
        if max_iterations.is_some_and(|max| stats.iterations >= max) {
            break;
        }

        tokio::time::sleep(pause).await;
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_default_to_zero() {
        let stats = EvictionStats::default();
        assert_eq!(stats.deleted, 0);
        assert_eq!(stats.iterations, 0);
    }
}
