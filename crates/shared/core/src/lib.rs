//! netchan Core Domain
//!
//! Pure domain types for named network channels.
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod channel;
pub mod cluster;
pub mod values;

// Re-export commonly used types at crate root
pub use channel::{
    ChannelName, ChannelState, ChannelStatus, Direction, Endpoint, NameError, StateCell,
    StatusSnapshot,
};
pub use cluster::{AgentId, AgentInfo, AgentResources};
pub use values::Timestamp;
