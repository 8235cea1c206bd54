use netchan_core::{ChannelName, Endpoint};
use thiserror::Error;

/// Errors returned by a directory service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Channel not found: {0}")]
    NotFound(ChannelName),

    #[error("Channel {name} already registered at {existing}")]
    AlreadyRegistered {
        name: ChannelName,
        existing: Endpoint,
    },

    #[error("Directory unavailable: {0}")]
    Unavailable(String),
}

pub type DirectoryResult<T> = std::result::Result<T, DirectoryError>;

/// Errors turning typed values into raw messages and back
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Encode failed for {type_name}: {reason}")]
    Encode {
        type_name: &'static str,
        reason: String,
    },

    #[error("Decode failed for {type_name}: {reason}")]
    Decode {
        type_name: &'static str,
        reason: String,
    },
}

pub type CodecResult<T> = std::result::Result<T, CodecError>;
