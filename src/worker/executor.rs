use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, Notify, Semaphore};
use tokio_util::task::TaskTracker;

use crate::scheduler::{Job, JobKey, JobState};
use crate::store::JobStore;
use crate::worker::registry::HandlerRegistry;

pub const INVALID_CLAIM_MESSAGE: &str = "invalid claim: job type and target object name are required";

/// Outcome of a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// An execution unit was spawned.
    Started,
    /// A unit for this job is still in flight.
    AlreadyRunning,
    /// Every execution permit is taken.
    Saturated,
    /// The executor is shutting down.
    Closed,
}

/// Result of running one job to a terminal state.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub key: JobKey,
    pub state: JobState,
    pub message: Option<String>,
    /// Whether the final status write reached the store.
    pub persisted: bool,
    /// Store version after the last accepted write.
    pub resource_version: Option<u64>,
}

/// Runs admitted jobs against their registered handlers.
///
/// Every execution unit holds a permit from a semaphore sized to the admission
/// ceiling plus slack, so the number of concurrently executing units is bounded
/// even when the store has not yet reflected their running state.
#[derive(Clone)]
pub struct JobExecutor {
    store: Arc<dyn JobStore>,
    registry: Arc<HandlerRegistry>,
    permits: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<JobKey>>>,
    finished: Arc<Notify>,
    tracker: TaskTracker,
}

impl JobExecutor {
    pub fn new(store: Arc<dyn JobStore>, registry: Arc<HandlerRegistry>, max_units: usize) -> Self {
        Self {
            store,
            registry,
            permits: Arc::new(Semaphore::new(max_units)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            finished: Arc::new(Notify::new()),
            tracker: TaskTracker::new(),
        }
    }

    /// Start an execution unit for `job` without waiting for it
    pub async fn dispatch(&self, job: Job) -> Dispatch {
        let key = job.key();
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.contains(&key) {
            tracing::debug!(job = %key, "Job already executing, skipping");
            return Dispatch::AlreadyRunning;
        }
        if self.tracker.is_closed() {
            tracing::debug!(job = %key, "Executor shutting down, not dispatching");
            return Dispatch::Closed;
        }
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!(job = %key, "No execution permit available");
                return Dispatch::Saturated;
            }
        };
        in_flight.insert(key.clone());
        drop(in_flight);

        let executor = self.clone();
        self.tracker.spawn(async move {
            executor.execute(job).await;
            drop(permit);
            executor.in_flight.lock().await.remove(&key);
            executor.finished.notify_one();
        });
        Dispatch::Started
    }

    /// Resolves once an execution unit has finished and released its permit.
    /// A completion with nobody waiting is remembered for the next call.
    pub async fn unit_finished(&self) {
        self.finished.notified().await;
    }

    /// Whether an execution unit for `key` is still running.
    pub async fn is_in_flight(&self, key: &JobKey) -> bool {
        self.in_flight.lock().await.contains(key)
    }

    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// Run a job to completion in the current task.
    ///
    /// Status writes are conditional on the snapshot they derive from. A rejected
    /// write is logged and not retried; the watcher's next observation converges
    /// the pool.
    pub async fn execute(&self, job: Job) -> ExecutionResult {
        let key = job.key();
        tracing::info!(job = %key, priority = job.priority, "Executing job");

        let mut running = job.clone();
        running.state = Some(JobState::Running);
        running.start_time = Some(Utc::now());
        let (base, started_version) = match self.store.patch(&job, &running).await {
            Ok(stored) => {
                let version = stored.resource_version;
                (stored, Some(version))
            }
            Err(e) => {
                tracing::warn!(job = %key, error = %e, "Failed to record job start");
                (running, None)
            }
        };

        let (state, message) = self.run_claim(&base).await;
        let mut result = self.finish(base, state, message).await;
        result.resource_version = result.resource_version.or(started_version);
        result
    }

    async fn run_claim(&self, job: &Job) -> (JobState, Option<String>) {
        let key = job.key();
        let claim = match job.claim.as_ref() {
            Some(claim) if claim.is_valid() => claim,
            _ => {
                tracing::warn!(job = %key, "Job has an invalid claim");
                return (JobState::Failed, Some(INVALID_CLAIM_MESSAGE.to_string()));
            }
        };

        let Some(handler) = self.registry.get(&claim.job_type) else {
            tracing::warn!(job = %key, job_type = %claim.job_type, "No handler registered");
            return (
                JobState::Failed,
                Some(format!(
                    "unsupported job type: no handler registered for \"{}\"",
                    claim.job_type
                )),
            );
        };

        match handler.handle(&claim.target).await {
            Ok(()) => (JobState::Completed, None),
            Err(e) => {
                tracing::warn!(job = %key, object = %claim.target, error = %e, "Handler failed");
                (JobState::Failed, Some(e.to_string()))
            }
        }
    }

    async fn finish(&self, base: Job, state: JobState, message: Option<String>) -> ExecutionResult {
        let key = base.key();
        let mut done = base.clone();
        done.state = Some(state);
        done.completion_time = Some(Utc::now());
        done.message = message.clone();

        let stored_version = match self.store.patch(&base, &done).await {
            Ok(stored) => Some(stored.resource_version),
            Err(e) => {
                tracing::warn!(job = %key, state = %state, error = %e, "Failed to record job completion");
                None
            }
        };

        tracing::info!(job = %key, state = %state, "Job finished");
        ExecutionResult {
            key,
            state,
            message,
            persisted: stored_version.is_some(),
            resource_version: stored_version,
        }
    }

    /// Stop accepting new units and wait for running ones.
    pub async fn shutdown(&self, grace: std::time::Duration) {
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            tracing::warn!(
                remaining = self.tracker.len(),
                "Timed out waiting for in-flight jobs"
            );
        }
    }
}
