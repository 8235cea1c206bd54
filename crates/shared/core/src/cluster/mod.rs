//! Cluster membership types shared by the leader and the agents

use crate::channel::Endpoint;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of one agent process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Local compute budget an agent hands out to channel relays
///
/// `max_executors` bounds concurrent relays on the agent itself; `cpu_level`
/// and `memory_mb` describe the node to the leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResources {
    /// Upper limit of concurrently running executors
    pub max_executors: usize,
    /// Relative computing power of a single core
    pub cpu_level: u32,
    /// Memory budget in MB
    pub memory_mb: u64,
}

impl AgentResources {
    /// Total compute units: executors weighted by per-core level
    pub fn compute_units(&self) -> u64 {
        self.max_executors as u64 * self.cpu_level as u64
    }

    /// Memory budget available to each executor slot, in MB
    pub fn memory_per_executor_mb(&self) -> u64 {
        if self.max_executors == 0 {
            return 0;
        }
        self.memory_mb / self.max_executors as u64
    }
}

impl Default for AgentResources {
    fn default() -> Self {
        Self {
            max_executors: 1,
            cpu_level: 1,
            memory_mb: 1024,
        }
    }
}

/// Agent self-description reported to the leader with each heartbeat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: AgentId,
    pub endpoint: Endpoint,
    pub data_center: String,
    pub rack: String,
    pub resources: AgentResources,
    pub executors_in_use: usize,
    pub hosted_channels: usize,
}

impl AgentInfo {
    pub fn free_executors(&self) -> usize {
        self.resources
            .max_executors
            .saturating_sub(self.executors_in_use)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_arithmetic() {
        let res = AgentResources {
            max_executors: 8,
            cpu_level: 2,
            memory_mb: 4096,
        };
        assert_eq!(res.compute_units(), 16);
        assert_eq!(res.memory_per_executor_mb(), 512);

        let empty = AgentResources {
            max_executors: 0,
            ..res
        };
        assert_eq!(empty.memory_per_executor_mb(), 0);
    }

    #[test]
    fn test_free_executors_saturates() {
        let info = AgentInfo {
            id: AgentId::new(),
            endpoint: Endpoint::parse("localhost:8931").unwrap(),
            data_center: "dc1".to_string(),
            rack: "r1".to_string(),
            resources: AgentResources::default(),
            executors_in_use: 3,
            hosted_channels: 0,
        };
        assert_eq!(info.free_executors(), 0);
    }
}
