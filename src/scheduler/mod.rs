pub mod assigner;
pub mod job;
pub mod ordered_set;
pub mod pool;

pub use assigner::Scheduler;
pub use job::{Claim, Job, JobKey, JobState, ObjectRef};
pub use ordered_set::OrderedSet;
pub use pool::{priority_fifo, JobNode, JobPool, PoolState};
