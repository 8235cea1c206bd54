//! Error types for the transport crate

use crate::wire::WireError;
use netchan_core::ChannelName;
use netchan_ports::{CodecError, DirectoryError};
use thiserror::Error;

/// Transport-level errors
///
/// Nothing in the transport retries: every failure is handed back to the
/// caller of the operation that observed it.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("Resolution failed: {0}")]
    Resolution(#[from] DirectoryError),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("TLS failure: {0}")]
    Tls(String),

    #[error("Channel {name} rejected by remote: {reason}")]
    Rejected { name: ChannelName, reason: String },

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Wire error: {0}")]
    Wire(WireError),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Stream ended before the channel was closed")]
    BrokenStream,

    #[error("Channel aborted: {0}")]
    Aborted(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<WireError> for TransportError {
    fn from(err: WireError) -> Self {
        match err {
            // A TLS failure is a TLS failure whether it shows up in the
            // handshake or on the first read after it
            WireError::Tls(reason) => TransportError::Tls(reason),
            other => TransportError::Wire(other),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

impl From<bincode::Error> for TransportError {
    fn from(err: bincode::Error) -> Self {
        TransportError::Serialization(err.to_string())
    }
}

/// Typed bridge errors
///
/// Codec failures are fatal for the bridge that hit them: the bridge stops
/// rather than keep interpreting a stream it can no longer trust.
#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    #[error("Decode failed after {delivered} values: {source}")]
    Decode {
        delivered: u64,
        #[source]
        source: CodecError,
    },

    #[error("Encode failed after {delivered} values: {source}")]
    Encode {
        delivered: u64,
        #[source]
        source: CodecError,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Typed output dropped by consumer")]
    OutputClosed,

    #[error("Bridge task failed: {0}")]
    Join(String),
}
