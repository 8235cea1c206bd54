//! Client for the leader's directory service
//!
//! Every call dials the leader, sends one request and reads one response.
//! Nothing is cached between calls.

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::net::{ChannelStream, dial, within};
use crate::wire::{DirectoryRequest, DirectoryResponse, Frame, read_frame, write_frame};
use async_trait::async_trait;
use log::debug;
use netchan_core::{AgentInfo, ChannelName, Endpoint};
use netchan_ports::{Directory, DirectoryError, DirectoryResult};
use tokio::io::AsyncWriteExt;

/// Directory backed by a remote leader
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    leader: Endpoint,
    config: TransportConfig,
}

impl DirectoryClient {
    pub fn new(leader: Endpoint, config: TransportConfig) -> Self {
        Self { leader, config }
    }

    pub fn leader(&self) -> &Endpoint {
        &self.leader
    }

    /// One request/response exchange with the leader
    pub async fn call(&self, request: &DirectoryRequest) -> Result<DirectoryResponse, TransportError> {
        let mut stream = dial(&self.leader, &self.config).await?;
        let response = within(self.config.connect_timeout(), "directory call", async {
            exchange(&mut stream, request).await
        })
        .await?;
        let _ = stream.shutdown().await;
        Ok(response)
    }

    /// Report agent liveness and load
    pub async fn heartbeat(&self, info: &AgentInfo) -> Result<(), TransportError> {
        match self.call(&DirectoryRequest::Heartbeat(info.clone())).await? {
            DirectoryResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Agents the leader currently considers alive
    pub async fn list_agents(&self) -> Result<Vec<AgentInfo>, TransportError> {
        match self.call(&DirectoryRequest::ListAgents).await? {
            DirectoryResponse::Agents(agents) => Ok(agents),
            other => Err(unexpected(other)),
        }
    }

    /// Resolve `name` without folding connection failures into the directory error.
    ///
    /// An unreachable leader stays a `Connection` (or `Tls`) error; only the
    /// leader's answer becomes `Resolution`.
    pub async fn lookup(&self, name: &ChannelName) -> Result<Endpoint, TransportError> {
        let request = DirectoryRequest::Resolve { name: name.clone() };
        debug!("Directory request to {}: {:?}", self.leader, request);
        match answer(self.call(&request).await?)? {
            DirectoryResponse::Endpoint(endpoint) => Ok(endpoint),
            other => Err(unexpected(other)),
        }
    }

    async fn directory_call(&self, request: DirectoryRequest) -> DirectoryResult<DirectoryResponse> {
        debug!("Directory request to {}: {:?}", self.leader, request);
        let response = self
            .call(&request)
            .await
            .map_err(|e| DirectoryError::Unavailable(format!("leader {}: {}", self.leader, e)))?;
        answer(response)
    }
}

/// Split the leader's refusals from its answers
fn answer(response: DirectoryResponse) -> DirectoryResult<DirectoryResponse> {
    match response {
        DirectoryResponse::NotFound(name) => Err(DirectoryError::NotFound(name)),
        DirectoryResponse::AlreadyRegistered { name, existing } => {
            Err(DirectoryError::AlreadyRegistered { name, existing })
        }
        DirectoryResponse::Failed(reason) => Err(DirectoryError::Unavailable(reason)),
        other => Ok(other),
    }
}

async fn exchange(
    stream: &mut ChannelStream,
    request: &DirectoryRequest,
) -> Result<DirectoryResponse, TransportError> {
    let payload = bincode::serialize(request)?;
    write_frame(stream, &Frame::Data(payload)).await?;

    match read_frame(stream).await? {
        Some(Frame::Data(payload)) => Ok(bincode::deserialize(&payload)?),
        Some(other) => Err(TransportError::Protocol(format!(
            "expected directory response, got {:?}",
            other.kind()
        ))),
        None => Err(TransportError::BrokenStream),
    }
}

fn unexpected(response: DirectoryResponse) -> TransportError {
    TransportError::Protocol(format!("unexpected directory response {:?}", response))
}

fn unexpected_dir(response: DirectoryResponse) -> DirectoryError {
    DirectoryError::Unavailable(format!("unexpected directory response {:?}", response))
}

#[async_trait]
impl Directory for DirectoryClient {
    async fn register(&self, name: &ChannelName, endpoint: &Endpoint) -> DirectoryResult<()> {
        let request = DirectoryRequest::Register {
            name: name.clone(),
            endpoint: endpoint.clone(),
        };
        match self.directory_call(request).await? {
            DirectoryResponse::Ok => Ok(()),
            other => Err(unexpected_dir(other)),
        }
    }

    async fn resolve(&self, name: &ChannelName) -> DirectoryResult<Endpoint> {
        let request = DirectoryRequest::Resolve { name: name.clone() };
        match self.directory_call(request).await? {
            DirectoryResponse::Endpoint(endpoint) => Ok(endpoint),
            other => Err(unexpected_dir(other)),
        }
    }

    async fn deregister(&self, name: &ChannelName) -> DirectoryResult<()> {
        let request = DirectoryRequest::Deregister { name: name.clone() };
        match self.directory_call(request).await? {
            DirectoryResponse::Ok => Ok(()),
            other => Err(unexpected_dir(other)),
        }
    }
}
