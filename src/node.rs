use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::dashboard::{run_dashboard, DashboardState};
use crate::error::Result;
use crate::scheduler::{Job, JobPool, Scheduler};
use crate::store::JobStore;
use crate::watcher::JobWatcher;
use crate::worker::{HandlerRegistry, JobExecutor};

/// Wires the pool, scheduler, executor and watcher together.
pub struct Node {
    pub config: NodeConfig,
    pub store: Arc<dyn JobStore>,
    pub pool: Arc<JobPool>,
    pub executor: JobExecutor,
}

impl Node {
    /// Build a node around `store`, dispatching to the handlers in `registry`.
    ///
    /// Returns the node and the receiving end of the pool's schedule signal,
    /// which [`Node::run`] hands to the scheduler.
    pub fn new(
        config: NodeConfig,
        store: Arc<dyn JobStore>,
        registry: HandlerRegistry,
    ) -> Result<(Self, mpsc::Receiver<()>)> {
        config.scheduler.validate()?;

        let (pool, signal_rx) = JobPool::new();
        let executor = JobExecutor::new(
            Arc::clone(&store),
            Arc::new(registry),
            config.scheduler.dispatch_permits(),
        );

        let node = Self {
            config,
            store,
            pool: Arc::new(pool),
            executor,
        };
        Ok((node, signal_rx))
    }

    /// Entry point for a job source: record an observed job snapshot.
    pub async fn notify(&self, job: &Job) -> bool {
        self.pool.sync_job(job).await
    }

    /// Run all components until `shutdown` is cancelled.
    ///
    /// 1. Spawns the watcher (initial listing, then change stream)
    /// 2. Spawns the scheduler control loop
    /// 3. Optionally spawns the dashboard
    /// 4. On shutdown, waits for the loops, then for in-flight executions up
    ///    to the configured grace period
    pub async fn run(self, signal_rx: mpsc::Receiver<()>, shutdown: CancellationToken) -> Result<()> {
        let watcher = JobWatcher::new(
            Arc::clone(&self.store),
            Arc::clone(&self.pool),
            self.config.scheduler.resync_interval(),
        );
        let watcher_token = shutdown.clone();
        let watcher_handle = tokio::spawn(async move {
            watcher.run(watcher_token).await;
        });

        let scheduler = Scheduler::new(
            Arc::clone(&self.pool),
            self.executor.clone(),
            self.config.scheduler.clone(),
        );
        let scheduler_token = shutdown.clone();
        let scheduler_handle = tokio::spawn(async move {
            scheduler.run(signal_rx, scheduler_token).await;
        });

        if let Some(dashboard_addr) = self.config.dashboard_addr {
            let dashboard_state = DashboardState {
                pool: Arc::clone(&self.pool),
                executor: self.executor.clone(),
                max_concurrent_jobs: self.config.scheduler.max_concurrent_jobs,
            };
            let dashboard_token = shutdown.clone();
            tokio::spawn(async move {
                run_dashboard(dashboard_addr, dashboard_state, dashboard_token).await;
            });
        }

        shutdown.cancelled().await;
        tracing::info!("Shutting down");

        for (name, handle) in [("watcher", watcher_handle), ("scheduler", scheduler_handle)] {
            if let Err(e) = handle.await {
                tracing::error!(task = name, error = %e, "Task ended abnormally");
            }
        }

        self.executor
            .shutdown(self.config.scheduler.shutdown_grace())
            .await;
        tracing::info!("Shutdown complete");
        Ok(())
    }
}
