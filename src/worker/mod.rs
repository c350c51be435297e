//! Job execution.
//!
//! - **Registry**: maps a claim's job type to the [`Handler`] that performs it.
//!   Built once at startup, immutable afterwards.
//! - **Executor**: runs one admitted job per execution unit. It records the
//!   start, validates the claim, invokes the handler, and records the outcome.
//!
//! # Execution Flow
//!
//! 1. The scheduling pass calls [`JobExecutor::dispatch`] for each admitted job
//! 2. The unit patches the job to `Running` in the store
//! 3. Claims without a type or target fail immediately, as do unregistered types
//! 4. The handler runs; its error text becomes the job message
//! 5. The unit patches the job to `Completed` or `Failed`
//!
//! The pool learns about these writes only through the watcher. Until it does,
//! the scheduling pass skips jobs it already admitted at their current
//! snapshot.

pub mod executor;
pub mod registry;

pub use executor::{Dispatch, ExecutionResult, JobExecutor};
pub use registry::{Handler, HandlerRegistry, HandlerRegistryBuilder};
