pub mod config;
pub mod dashboard;
pub mod error;
pub mod node;
pub mod scheduler;
pub mod shutdown;
pub mod store;
pub mod watcher;
pub mod worker;

pub use error::{Result, SchedulerError};
