use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Handler already registered for job type: {0}")]
    DuplicateHandler(String),

    #[error("Conflict writing job {key}: expected version {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
