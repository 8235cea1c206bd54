//! netchan Leader
//!
//! The cluster's directory service. Maps channel names to the endpoint of
//! the agent hosting them and keeps the list of live agents.
//!
//! ```text
//! agent ──register/deregister/heartbeat──┐
//!                                        ▼
//!                                  ┌──────────┐
//!                                  │ Registry │
//!                                  └──────────┘
//!                                        ▲
//! consumer ───────── resolve ────────────┘
//! ```

pub mod config;
pub mod error;
pub mod registry;
pub mod server;

pub use config::LeaderConfig;
pub use error::{LeaderError, Result};
pub use registry::Registry;
pub use server::LeaderServer;
