use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Result, SchedulerError};

/// Admission and dispatch tunables.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Ceiling on jobs the pool may record as running.
    pub max_concurrent_jobs: usize,
    /// Minimum delay between two scheduling passes.
    pub schedule_interval_ms: u64,
    /// Extra execution permits above the ceiling, covering jobs whose
    /// running state has not been observed yet.
    pub dispatch_slack: usize,
    /// Period of full re-list from the job store.
    pub resync_interval_ms: u64,
    /// How long shutdown waits for in-flight executions.
    pub shutdown_grace_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 5,
            schedule_interval_ms: 3000,
            dispatch_slack: 2,
            resync_interval_ms: 30_000,
            shutdown_grace_ms: 10_000,
        }
    }
}

impl SchedulerConfig {
    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    pub fn with_schedule_interval_ms(mut self, interval_ms: u64) -> Self {
        self.schedule_interval_ms = interval_ms;
        self
    }

    pub fn with_dispatch_slack(mut self, slack: usize) -> Self {
        self.dispatch_slack = slack;
        self
    }

    pub fn with_resync_interval_ms(mut self, interval_ms: u64) -> Self {
        self.resync_interval_ms = interval_ms;
        self
    }

    pub fn with_shutdown_grace_ms(mut self, grace_ms: u64) -> Self {
        self.shutdown_grace_ms = grace_ms;
        self
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_millis(self.schedule_interval_ms)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_millis(self.resync_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Number of execution permits: the ceiling plus slack.
    pub fn dispatch_permits(&self) -> usize {
        self.max_concurrent_jobs + self.dispatch_slack
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.resync_interval_ms == 0 {
            return Err(SchedulerError::InvalidConfig(
                "resync_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    pub scheduler: SchedulerConfig,
    /// Serve the status dashboard when set.
    pub dashboard_addr: Option<SocketAddr>,
}

impl NodeConfig {
    pub fn new(scheduler: SchedulerConfig) -> Self {
        Self {
            scheduler,
            dashboard_addr: None,
        }
    }

    pub fn with_dashboard(mut self, addr: SocketAddr) -> Self {
        self.dashboard_addr = Some(addr);
        self
    }
}
