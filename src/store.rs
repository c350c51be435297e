//! Boundary to the external job store.
//!
//! The store owns the durable copy of every job. The pool only ever sees
//! snapshots delivered through [`JobStore::list`] and [`JobStore::subscribe`],
//! and the executor only writes status back through [`JobStore::patch`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};

use crate::error::{Result, SchedulerError};
use crate::scheduler::{Job, JobKey};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// All jobs currently held by the store
    async fn list(&self) -> Result<Vec<Job>>;

    /// Stream of job snapshots, one per observed change
    fn subscribe(&self) -> broadcast::Receiver<Job>;

    /// Conditional status write.
    ///
    /// Applies the status fields of `modified` only if the stored object still
    /// carries `original.resource_version`. Returns the stored result.
    async fn patch(&self, original: &Job, modified: &Job) -> Result<Job>;
}

/// In-process job store with versioned writes and change broadcast.
#[derive(Debug)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobKey, Job>>,
    events: broadcast::Sender<Job>,
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJobStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            jobs: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Create or replace a job with a fresh version
    pub async fn apply(&self, mut job: Job) -> Job {
        let key = job.key();
        let mut jobs = self.jobs.write().await;
        job.resource_version = jobs
            .get(&key)
            .map(|existing| existing.resource_version + 1)
            .unwrap_or(1);
        jobs.insert(key, job.clone());
        drop(jobs);
        self.publish(&job);
        job
    }

    /// Remove a job. Watchers see one last snapshot carrying a deletion marker.
    pub async fn delete(&self, key: &JobKey) -> Result<Job> {
        let mut removed = self
            .jobs
            .write()
            .await
            .remove(key)
            .ok_or_else(|| SchedulerError::JobNotFound(key.to_string()))?;
        removed.deletion_timestamp = Some(Utc::now());
        removed.resource_version += 1;
        self.publish(&removed);
        Ok(removed)
    }

    pub async fn get(&self, key: &JobKey) -> Option<Job> {
        self.jobs.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    fn publish(&self, job: &Job) {
        // No subscribers is not an error; the next list() catches them up.
        let _ = self.events.send(job.clone());
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn list(&self) -> Result<Vec<Job>> {
        Ok(self.jobs.read().await.values().cloned().collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<Job> {
        self.events.subscribe()
    }

    async fn patch(&self, original: &Job, modified: &Job) -> Result<Job> {
        let key = original.key();
        let mut jobs = self.jobs.write().await;
        let stored = jobs
            .get_mut(&key)
            .ok_or_else(|| SchedulerError::JobNotFound(key.to_string()))?;

        if stored.resource_version != original.resource_version {
            return Err(SchedulerError::Conflict {
                key: key.to_string(),
                expected: original.resource_version,
                actual: stored.resource_version,
            });
        }

        stored.state = modified.state;
        stored.start_time = modified.start_time;
        stored.completion_time = modified.completion_time;
        stored.message = modified.message.clone();
        stored.resource_version += 1;

        let updated = stored.clone();
        drop(jobs);
        self.publish(&updated);
        Ok(updated)
    }
}
