//! Executor slots
//!
//! Every relay the agent runs holds one slot for its whole lifetime. When
//! the pool is empty new work is refused, never queued.

use netchan_core::AgentResources;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded pool of executor slots
#[derive(Clone)]
pub struct ExecutorPool {
    slots: Arc<Semaphore>,
    resources: AgentResources,
}

/// One occupied slot; released on drop
pub struct ExecutorSlot {
    _permit: OwnedSemaphorePermit,
}

impl ExecutorPool {
    pub fn new(resources: AgentResources) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(resources.max_executors)),
            resources,
        }
    }

    /// Take a slot if one is free
    pub fn try_acquire(&self) -> Option<ExecutorSlot> {
        self.slots
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| ExecutorSlot { _permit: permit })
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.resources.max_executors - self.available()
    }

    pub fn resources(&self) -> AgentResources {
        self.resources
    }
}
