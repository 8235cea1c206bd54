//! Channel handles and the raw message traits the typed bridge runs on
//!
//! The traits let the bridge drive network handles and in-process pairs
//! alike without knowing where the bytes go.

pub mod handle;
pub mod local;
pub mod open;
pub mod server;

use crate::error::TransportError;
use async_trait::async_trait;
use netchan_core::ChannelName;

pub use handle::{ReceiveHandle, SendHandle};
pub use local::{LocalSink, LocalSource, local_pair};
pub use open::{
    open_direct_receive, open_direct_send, open_receive, open_receive_via, open_send,
};
pub use server::{ChannelListener, IncomingChannel, Upgrader};

/// Producer side of a raw channel
#[async_trait]
pub trait RawSink: Send {
    /// Write one message; waits while the channel buffer is full
    async fn send(&mut self, msg: Vec<u8>) -> Result<(), TransportError>;

    /// Signal end of stream and wait until the consumer side confirmed it.
    ///
    /// Returns the number of messages delivered.
    async fn close(&mut self) -> Result<u64, TransportError>;

    /// Stop without a clean end of stream; the consumer sees a broken stream
    async fn abort(&mut self, reason: &str);

    fn name(&self) -> &ChannelName;
}

/// Consumer side of a raw channel
#[async_trait]
pub trait RawSource: Send {
    /// Next message, `Ok(None)` once the producer closed the channel
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError>;

    fn name(&self) -> &ChannelName;
}
