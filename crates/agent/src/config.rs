//! Agent configuration

use crate::error::{AgentError, Result};
use netchan_core::{AgentResources, Endpoint};
use netchan_transport::{DEFAULT_AGENT_PORT, TransportConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Node agent settings, loadable from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Address to listen on (`host:port`)
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Endpoint published to the leader; defaults to the bound address
    #[serde(default)]
    pub advertise: Option<Endpoint>,

    /// Leader to register channels with; standalone when absent
    #[serde(default)]
    pub leader: Option<Endpoint>,

    /// Scratch directory for executors, created on startup. Hosted channel
    /// queues stay in memory and never touch it.
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_data_center")]
    pub data_center: String,

    #[serde(default = "default_rack")]
    pub rack: String,

    /// Executor slots are enforced; CPU level and memory are advertised to
    /// the leader for placement
    #[serde(default)]
    pub resources: AgentResources,

    /// Messages a hosted channel holds before its producer is pushed back
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_listen() -> String {
    format!("localhost:{}", DEFAULT_AGENT_PORT)
}

fn default_dir() -> PathBuf {
    std::env::temp_dir().join("netchan")
}

fn default_data_center() -> String {
    "defaultDataCenter".to_string()
}

fn default_rack() -> String {
    "defaultRack".to_string()
}

fn default_channel_buffer() -> usize {
    64
}

fn default_heartbeat_interval_ms() -> u64 {
    5_000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            advertise: None,
            leader: None,
            dir: default_dir(),
            data_center: default_data_center(),
            rack: default_rack(),
            resources: AgentResources::default(),
            channel_buffer: default_channel_buffer(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            transport: TransportConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| AgentError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| AgentError::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.resources.max_executors == 0 {
            return Err(AgentError::Config("max executors must be at least 1".into()));
        }
        if self.resources.memory_per_executor_mb() == 0 {
            return Err(AgentError::Config(format!(
                "memory budget of {} MB cannot cover {} executors",
                self.resources.memory_mb, self.resources.max_executors
            )));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(AgentError::Config("heartbeat interval must be positive".into()));
        }
        Ok(())
    }
}
