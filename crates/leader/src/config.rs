//! Leader configuration

use netchan_transport::{DEFAULT_LEADER_PORT, TransportConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Leader (directory service) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderConfig {
    /// Address to listen on (`host:port`)
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Agents silent for longer than this are dropped from the member list
    #[serde(default = "default_agent_timeout_ms")]
    pub agent_timeout_ms: u64,

    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_listen() -> String {
    format!("localhost:{}", DEFAULT_LEADER_PORT)
}

fn default_agent_timeout_ms() -> u64 {
    15_000
}

impl Default for LeaderConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            agent_timeout_ms: default_agent_timeout_ms(),
            transport: TransportConfig::default(),
        }
    }
}

impl LeaderConfig {
    pub fn new(listen: impl Into<String>) -> Self {
        Self {
            listen: listen.into(),
            ..Default::default()
        }
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LeaderConfig::default();
        assert_eq!(config.listen, "localhost:8930");
        assert_eq!(config.agent_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_partial_json() {
        let config: LeaderConfig = serde_json::from_str(r#"{"listen": "0.0.0.0:9000"}"#).unwrap();
        assert_eq!(config.listen, "0.0.0.0:9000");
        assert_eq!(config.agent_timeout_ms, 15_000);
        assert!(config.transport.tls.is_none());
    }
}
