use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::scheduler::job::JobKey;
use crate::scheduler::pool::JobPool;
use crate::worker::executor::{Dispatch, JobExecutor};

/// Admission control loop.
///
/// Wakes on the pool's schedule signal, admits pending jobs in priority order
/// up to the running ceiling, and hands them to the executor.
pub struct Scheduler {
    pool: Arc<JobPool>,
    executor: JobExecutor,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(pool: Arc<JobPool>, executor: JobExecutor, config: SchedulerConfig) -> Self {
        Self {
            pool,
            executor,
            config,
        }
    }

    /// Run until the signal channel closes or `shutdown` is cancelled.
    ///
    /// After each pass the loop sleeps for the configured interval before it
    /// accepts the next signal. Signals arriving meanwhile coalesce into one.
    /// A pass cut short by exhausted execution permits is retried as soon as a
    /// unit finishes.
    pub async fn run(&self, mut signal_rx: mpsc::Receiver<()>, shutdown: CancellationToken) {
        let interval = self.config.schedule_interval();
        tracing::info!(
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            interval_ms = self.config.schedule_interval_ms,
            "Scheduler started"
        );

        let mut saturated = false;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                signal = signal_rx.recv() => {
                    if signal.is_none() {
                        tracing::debug!("Schedule signal channel closed");
                        break;
                    }
                }
                _ = self.executor.unit_finished(), if saturated => {
                    tracing::debug!("Execution permit released, retrying pass");
                }
            }
            saturated = self.pass().await.saturated;

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        tracing::info!("Scheduler stopped");
    }

    /// One scheduling pass, returning the keys of the admitted jobs
    ///
    /// Holds the pool lock for the whole walk. Jobs past the point where
    /// capacity runs out stay pending until the next signal; capacity freed
    /// during the pass is not backfilled. Jobs admitted at their current
    /// snapshot are skipped without spending capacity.
    pub async fn schedule(&self) -> Vec<JobKey> {
        self.pass().await.admitted
    }

    async fn pass(&self) -> Pass {
        let mut state = self.pool.lock().await;
        let running = state.running().len();
        let max = self.config.max_concurrent_jobs;

        if running >= max {
            tracing::debug!(running, max, "No capacity available");
            return Pass::default();
        }
        let mut available = max - running;

        let mut admitted = Vec::new();
        let mut saturated = false;
        for node in state.pending() {
            if available == 0 {
                break;
            }
            if state.is_admitted(node.key()) {
                tracing::trace!(job = %node.key(), "Job already admitted at this snapshot");
                continue;
            }
            match self.executor.dispatch(node.job().clone()).await {
                Dispatch::Started => {
                    available -= 1;
                    tracing::debug!(job = %node.key(), priority = node.priority(), "Job admitted");
                    admitted.push(node.key().clone());
                }
                Dispatch::AlreadyRunning => continue,
                Dispatch::Saturated => {
                    saturated = true;
                    break;
                }
                Dispatch::Closed => break,
            }
        }

        for key in &admitted {
            state.mark_admitted(key);
        }

        if !admitted.is_empty() {
            tracing::info!(
                admitted = admitted.len(),
                pending = state.pending().len(),
                running,
                "Scheduling pass complete"
            );
        }
        Pass {
            admitted,
            saturated,
        }
    }
}

#[derive(Debug, Default)]
struct Pass {
    admitted: Vec<JobKey>,
    /// The walk stopped because no execution permit was free.
    saturated: bool,
}
