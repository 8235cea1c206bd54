//! netchan Agent
//!
//! Node broker that hosts channels for local producers. A producer opens
//! its channel against the agent; the agent queues the messages, publishes
//! the channel with the leader and streams the queue to the one consumer
//! that resolves it.
//!
//! ```text
//! producer ──Data*/Close──► ┌────────────────────┐ ──Data*/Close──► consumer
//!          ◄──── Ack ────── │ hosted queue (name)│ ◄──── Ack ─────
//!                           └─────────┬──────────┘
//!                                     │ register / deregister / heartbeat
//!                                     ▼
//!                                  leader
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod hosted;
pub mod server;

pub use config::AgentConfig;
pub use error::{AgentError, Result};
pub use executor::{ExecutorPool, ExecutorSlot};
pub use hosted::{HostedChannel, HostedChannels};
pub use server::AgentServer;
