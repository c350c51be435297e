use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex, MutexGuard};

use crate::scheduler::job::{Job, JobKey, JobState};
use crate::scheduler::ordered_set::OrderedSet;

/// Pool-owned copy of a job snapshot. Equality is by job identity.
#[derive(Debug, Clone)]
pub struct JobNode {
    key: JobKey,
    job: Job,
}

impl JobNode {
    pub fn new(job: &Job) -> Self {
        Self {
            key: job.key(),
            job: job.clone(),
        }
    }

    pub fn key(&self) -> &JobKey {
        &self.key
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn priority(&self) -> i32 {
        self.job.priority
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.job.created_at
    }

    pub fn state(&self) -> Option<JobState> {
        self.job.state
    }
}

impl PartialEq for JobNode {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

/// Priority-based FIFO: higher priority first, then earlier creation time,
/// then `{namespace}_{name}` lexicographically.
pub fn priority_fifo(a: &JobNode, b: &JobNode) -> bool {
    if a.priority() != b.priority() {
        return a.priority() > b.priority();
    }
    if a.created_at() != b.created_at() {
        return a.created_at() < b.created_at();
    }
    a.key.sort_key() < b.key.sort_key()
}

/// Index plus the two derived views. Only reachable through [`JobPool::lock`].
#[derive(Debug)]
pub struct PoolState {
    index: HashMap<JobKey, JobNode>,
    pending: OrderedSet<JobNode>,
    running: OrderedSet<JobNode>,
    /// Indexed jobs already handed to the executor at their current snapshot.
    admitted: HashSet<JobKey>,
}

impl PoolState {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            pending: OrderedSet::new(priority_fifo),
            running: OrderedSet::new(priority_fifo),
            admitted: HashSet::new(),
        }
    }

    pub fn pending(&self) -> &OrderedSet<JobNode> {
        &self.pending
    }

    pub fn running(&self) -> &OrderedSet<JobNode> {
        &self.running
    }

    pub fn get(&self, key: &JobKey) -> Option<&JobNode> {
        self.index.get(key)
    }

    pub fn contains(&self, key: &JobKey) -> bool {
        self.index.contains_key(key)
    }

    /// Indexed jobs, pending plus running
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Record that the current snapshot of `key` was dispatched.
    ///
    /// The mark lasts until the pool sees a newer snapshot of the job or drops
    /// it, so a job still shown pending after its unit has run is not started
    /// again from the same snapshot. Returns false for unknown keys.
    pub fn mark_admitted(&mut self, key: &JobKey) -> bool {
        if !self.index.contains_key(key) {
            return false;
        }
        self.admitted.insert(key.clone());
        true
    }

    pub fn is_admitted(&self, key: &JobKey) -> bool {
        self.admitted.contains(key)
    }

    fn set_for(&mut self, state: JobState) -> Option<&mut OrderedSet<JobNode>> {
        match state {
            JobState::Pending => Some(&mut self.pending),
            JobState::Running => Some(&mut self.running),
            JobState::Completed | JobState::Failed => None,
        }
    }

    fn insert(&mut self, node: JobNode, state: JobState) -> bool {
        let Some(set) = self.set_for(state) else {
            return false;
        };
        set.add(node.clone());
        self.index.insert(node.key.clone(), node);
        true
    }

    fn remove(&mut self, node: &JobNode) -> Option<JobNode> {
        self.pending.delete(node);
        self.running.delete(node);
        self.admitted.remove(&node.key);
        self.index.remove(&node.key)
    }

    /// Replace the stored snapshot in place, re-sorting it within its set.
    /// A newer version clears the admission mark.
    fn replace(&mut self, node: JobNode, state: JobState, newer: bool) {
        if newer {
            self.admitted.remove(&node.key);
        }
        if let Some(set) = self.set_for(state) {
            set.delete(&node);
            set.add(node.clone());
        }
        self.index.insert(node.key.clone(), node);
    }
}

/// Authoritative in-memory index of live jobs.
///
/// Every structural change that could free or demand a slot pushes a
/// coalesced schedule signal onto a capacity-1 channel.
#[derive(Debug)]
pub struct JobPool {
    state: Mutex<PoolState>,
    signal_tx: mpsc::Sender<()>,
}

impl JobPool {
    /// Create a pool and the receiving end of its schedule signal.
    pub fn new() -> (Self, mpsc::Receiver<()>) {
        let (signal_tx, signal_rx) = mpsc::channel(1);
        let pool = Self {
            state: Mutex::new(PoolState::new()),
            signal_tx,
        };
        (pool, signal_rx)
    }

    /// Acquire the pool lock; `sync_job` waits while it is held
    pub async fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().await
    }

    /// Upsert a job snapshot and apply its state transition.
    ///
    /// Returns whether a schedule signal was requested. Jobs with no state are ignored.
    pub async fn sync_job(&self, job: &Job) -> bool {
        let Some(new_state) = job.state else {
            tracing::trace!(job = %job.key(), "Ignoring job without state");
            return false;
        };

        let node = JobNode::new(job);
        let mut state = self.state.lock().await;

        if job.is_deleting() {
            if state.remove(&node).is_some() {
                tracing::debug!(job = %node.key, "Job deleted, removed from pool");
            }
            drop(state);
            self.signal();
            return true;
        }

        let existing = state
            .get(&node.key)
            .map(|existing| (existing.state(), existing.job.resource_version));
        let Some((previous, version)) = existing else {
            if new_state.is_terminal() {
                tracing::trace!(job = %node.key, state = %new_state, "Not admitting job in terminal state");
                return false;
            }
            state.insert(node.clone(), new_state);
            tracing::debug!(
                job = %node.key,
                state = %new_state,
                priority = node.priority(),
                "Job added to pool"
            );
            drop(state);
            self.signal();
            return true;
        };

        if job.resource_version < version {
            tracing::trace!(job = %node.key, "Ignoring stale job snapshot");
            return false;
        }

        match previous {
            Some(prev) if prev == new_state => {
                state.replace(node, new_state, job.resource_version > version);
                false
            }
            Some(JobState::Pending) => {
                state.remove(&node);
                if new_state == JobState::Running {
                    state.insert(node.clone(), JobState::Running);
                    tracing::debug!(job = %node.key, "Job moved from pending to running");
                } else {
                    tracing::debug!(job = %node.key, state = %new_state, "Pending job finished before running");
                }
                false
            }
            Some(JobState::Running) => {
                state.remove(&node);
                if new_state == JobState::Pending {
                    state.insert(node.clone(), JobState::Pending);
                    tracing::info!(job = %node.key, "Running job requeued");
                } else {
                    tracing::debug!(job = %node.key, state = %new_state, "Running job left the pool");
                }
                drop(state);
                self.signal();
                true
            }
            // Indexed nodes are only ever pending or running.
            _ => {
                state.remove(&node);
                false
            }
        }
    }

    /// Drop indexed jobs missing from `live`, signalling if any were removed
    pub async fn prune(&self, live: &HashSet<JobKey>) -> usize {
        let mut state = self.state.lock().await;
        let stale: Vec<JobNode> = state
            .index
            .values()
            .filter(|node| !live.contains(&node.key))
            .cloned()
            .collect();
        for node in &stale {
            state.remove(node);
            tracing::info!(job = %node.key, "Pruned job no longer present in store");
        }
        drop(state);
        if !stale.is_empty() {
            self.signal();
        }
        stale.len()
    }

    /// Non-blocking send, absorbed by an already queued signal
    fn signal(&self) {
        match self.signal_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
            Err(mpsc::error::TrySendError::Closed(())) => {
                tracing::trace!("Schedule signal receiver closed");
            }
        }
    }
}
