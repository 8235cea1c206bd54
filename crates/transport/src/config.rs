//! Transport configuration
//!
//! Every constructor that opens or accepts connections takes a
//! `TransportConfig` explicitly; there is no process-wide default.

use crate::tls::TlsSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default listening port of the leader (directory service)
pub const DEFAULT_LEADER_PORT: u16 = 8930;

/// Default listening port of a node agent
pub const DEFAULT_AGENT_PORT: u16 = 8931;

/// Connection settings shared by clients and servers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Upper bound for TCP connect, TLS handshake and channel handshake
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Messages a producer may queue ahead of the network relay
    #[serde(default = "default_send_buffer")]
    pub send_buffer: usize,

    /// TLS material; plaintext when absent
    #[serde(default)]
    pub tls: Option<TlsSettings>,
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_send_buffer() -> usize {
    1
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            send_buffer: default_send_buffer(),
            tls: None,
        }
    }
}

impl TransportConfig {
    /// Plaintext transport with default timeouts
    pub fn plain() -> Self {
        Self::default()
    }

    /// Transport wrapped in TLS
    pub fn with_tls(tls: TlsSettings) -> Self {
        Self {
            tls: Some(tls),
            ..Default::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn send_capacity(&self) -> usize {
        queue_capacity(self.send_buffer)
    }
}

/// Queue capacity for a caller-supplied buffer size.
///
/// tokio queues need at least one slot, so a buffer size of 0 (unbuffered)
/// maps to a single in-flight message.
pub fn queue_capacity(buffer_size: usize) -> usize {
    buffer_size.max(1)
}
