use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Result, SchedulerError};
use crate::scheduler::ObjectRef;

/// Executor for one job type.
///
/// Receives the object named by the job's claim and performs the job's effect.
/// Any error fails the job, with the error text recorded as its message.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, target: &ObjectRef) -> anyhow::Result<()>;
}

#[async_trait]
impl<T: Handler + ?Sized> Handler for Arc<T> {
    async fn handle(&self, target: &ObjectRef) -> anyhow::Result<()> {
        (**self).handle(target).await
    }
}

/// Builder for [`HandlerRegistry`], used before the scheduler starts
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a job type, rejecting duplicates
    pub fn register(
        &mut self,
        job_type: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<&mut Self> {
        let job_type = job_type.into();
        if self.handlers.contains_key(&job_type) {
            return Err(SchedulerError::DuplicateHandler(job_type));
        }
        tracing::debug!(job_type = %job_type, "Handler registered");
        self.handlers.insert(job_type, handler);
        Ok(self)
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

/// Immutable job-type to handler table.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::new()
    }

    /// Exact-match lookup
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn job_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}
