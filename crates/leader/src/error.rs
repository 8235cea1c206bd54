//! Error types for the leader

use netchan_transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LeaderError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, LeaderError>;
