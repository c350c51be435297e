use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a job as recorded in the external store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Running => write!(f, "running"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// Identity of a job: namespace plus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub namespace: String,
    pub name: String,
}

impl JobKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Final tie-break key used by the pending order: `{namespace}_{name}`.
    pub fn sort_key(&self) -> String {
        format!("{}_{}", self.namespace, self.name)
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Reference to the object a handler acts on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
}

impl ObjectRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Dispatch payload: which handler runs, and against which object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    #[serde(default)]
    pub job_type: String,
    #[serde(default)]
    pub target: ObjectRef,
}

impl Claim {
    pub fn new(job_type: impl Into<String>, target: ObjectRef) -> Self {
        Self {
            job_type: job_type.into(),
            target,
        }
    }

    /// A claim needs both a job type and a target object name.
    pub fn is_valid(&self) -> bool {
        !self.job_type.is_empty() && !self.target.name.is_empty()
    }
}

/// Snapshot of a job resource as observed from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub namespace: String,
    pub name: String,
    /// Store-assigned version, bumped on every write. Conditional writes are keyed off it.
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub claim: Option<Claim>,
    /// `None` means the job is not yet actionable.
    #[serde(default)]
    pub state: Option<JobState>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Job {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, priority: i32) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            resource_version: 0,
            priority,
            created_at: Utc::now(),
            deletion_timestamp: None,
            claim: None,
            state: Some(JobState::Pending),
            start_time: None,
            completion_time: None,
            message: None,
        }
    }

    pub fn with_claim(mut self, job_type: impl Into<String>, target: ObjectRef) -> Self {
        self.claim = Some(Claim::new(job_type, target));
        self
    }

    pub fn with_state(mut self, state: JobState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(self.namespace.clone(), self.name.clone())
    }

    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}
