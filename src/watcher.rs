use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::scheduler::JobPool;
use crate::store::JobStore;

/// Feeds store observations into the pool.
///
/// Lists once on start, then forwards every change. A full re-list happens on
/// every resync tick and whenever the change stream lags; it also prunes pool
/// entries the store no longer knows.
pub struct JobWatcher {
    store: Arc<dyn JobStore>,
    pool: Arc<JobPool>,
    resync_interval: Duration,
}

impl JobWatcher {
    pub fn new(store: Arc<dyn JobStore>, pool: Arc<JobPool>, resync_interval: Duration) -> Self {
        Self {
            store,
            pool,
            resync_interval,
        }
    }

    /// Re-list the store into the pool, returning the number of jobs seen
    pub async fn resync(&self) -> Result<usize> {
        let jobs = self.store.list().await?;
        let mut live = HashSet::with_capacity(jobs.len());
        for job in &jobs {
            live.insert(job.key());
            self.pool.sync_job(job).await;
        }
        let pruned = self.pool.prune(&live).await;
        tracing::debug!(jobs = jobs.len(), pruned, "Resynced jobs from store");
        Ok(jobs.len())
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        // Subscribe before listing so no change between the two is lost.
        let mut events = self.store.subscribe();

        if let Err(e) = self.resync().await {
            tracing::error!(error = %e, "Initial job listing failed");
        }

        let mut resync = tokio::time::interval(self.resync_interval);
        // The first tick fires immediately; the initial listing already covered it.
        resync.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Ok(job) => {
                        tracing::trace!(job = %job.key(), state = ?job.state, "Observed job change");
                        self.pool.sync_job(&job).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Job watch lagged, resyncing");
                        if let Err(e) = self.resync().await {
                            tracing::error!(error = %e, "Job resync failed");
                        }
                    }
                    Err(RecvError::Closed) => {
                        tracing::info!("Job store closed its change stream");
                        break;
                    }
                },
                _ = resync.tick() => {
                    if let Err(e) = self.resync().await {
                        tracing::error!(error = %e, "Periodic job resync failed");
                    }
                }
            }
        }

        tracing::info!("Job watcher stopped");
    }
}
