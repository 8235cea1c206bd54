//! netchan Transport
//!
//! Named, one-way byte channels between processes. Provides:
//! - Length-prefixed framing and the channel session handshake
//! - Discovered opens (through the local agent and the leader) and direct opens
//! - Optional TLS on every connection
//! - A typed bridge that runs values through a `Codec`
//!
//! ## Architecture
//!
//! ```text
//!  producer                                     consumer
//!     │ open_send(name)                            │ open_receive(name)
//! ┌───▼────┐  Hello/Data*/Close   ┌───────┐        │ resolve(name)
//! │ Send   ├─────────────────────►│ Agent │◄───────┤──────────┐
//! │ Handle │◄─────── Ack ─────────┤ (host)├──Data*─►│ Receive  │ ┌────────┐
//! └────────┘                      └───┬───┘        │ Handle   │ │ Leader │
//!                                     │ register   └──────────┘ │ (dir)  │
//!                                     └─────────────────────────►└────────┘
//! ```
//!
//! ## Direct mode
//!
//! `open_direct_send` / `open_direct_receive` skip the agent and the leader
//! and talk to a `ChannelListener` at a known endpoint. Sessions are
//! byte-identical to discovered mode once the handshake is done.

pub mod bridge;
pub mod channel;
pub mod codec;
pub mod config;
pub mod directory;
pub mod error;
pub mod net;
pub mod relay;
pub mod tls;
pub mod wire;

// Re-export commonly used types
pub use bridge::{Relay, RelayGroup, bridge_receive_to_typed, bridge_typed_to_raw};
pub use channel::{
    ChannelListener, IncomingChannel, LocalSink, LocalSource, RawSink, RawSource, ReceiveHandle,
    SendHandle, Upgrader, local_pair, open_direct_receive, open_direct_send, open_receive,
    open_receive_via, open_send,
};
pub use codec::{BincodeCodec, JsonCodec};
pub use config::{DEFAULT_AGENT_PORT, DEFAULT_LEADER_PORT, TransportConfig, queue_capacity};
pub use directory::DirectoryClient;
pub use error::{BridgeError, TransportError};
pub use net::ChannelStream;
pub use relay::{MessageResult, pump_inbound, pump_outbound};
pub use tls::TlsSettings;
