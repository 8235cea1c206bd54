//! Error types for the agent

use netchan_ports::DirectoryError;
use netchan_transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
