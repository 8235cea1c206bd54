//! Session and directory messages carried inside frames

use netchan_core::{AgentInfo, ChannelName, Direction, Endpoint};
use serde::{Deserialize, Serialize};

/// Version of the channel session protocol
pub const PROTOCOL_VERSION: u16 = 1;

/// First frame of every channel session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelHello {
    pub version: u16,
    pub name: ChannelName,
    /// Role of the connecting peer
    pub direction: Direction,
    /// Ask the hosting broker to publish the channel in the directory
    pub announce: bool,
}

impl ChannelHello {
    pub fn new(name: ChannelName, direction: Direction, announce: bool) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            name,
            direction,
            announce,
        }
    }
}

/// Request to the leader, sent as one `Data` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DirectoryRequest {
    Register { name: ChannelName, endpoint: Endpoint },
    Resolve { name: ChannelName },
    Deregister { name: ChannelName },
    Heartbeat(AgentInfo),
    ListAgents,
}

/// Leader answer to one `DirectoryRequest`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DirectoryResponse {
    Ok,
    Endpoint(Endpoint),
    Agents(Vec<AgentInfo>),
    NotFound(ChannelName),
    AlreadyRegistered {
        name: ChannelName,
        existing: Endpoint,
    },
    Failed(String),
}
