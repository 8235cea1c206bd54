//! Directory server
//!
//! Each connection carries framed bincode `DirectoryRequest`s; every
//! request gets exactly one `DirectoryResponse`. Connections are served
//! concurrently, one task each.

use crate::config::LeaderConfig;
use crate::error::{LeaderError, Result};
use crate::registry::Registry;
use log::{debug, error, info, warn};
use netchan_core::Endpoint;
use netchan_transport::wire::{DirectoryRequest, Frame, read_frame, write_frame};
use netchan_transport::{ChannelListener, ChannelStream, TransportError};
use std::net::SocketAddr;
use tokio::task::JoinHandle;

/// Bound leader, ready to serve
pub struct LeaderServer {
    listener: ChannelListener,
    registry: Registry,
}

impl LeaderServer {
    pub async fn bind(config: &LeaderConfig) -> Result<Self> {
        let listener = ChannelListener::bind(&config.listen, &config.transport).await?;
        info!("Leader listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            registry: Registry::new(config.agent_timeout()),
        })
    }

    pub fn local_endpoint(&self) -> Result<Endpoint> {
        Ok(self.listener.local_endpoint()?)
    }

    /// Shared handle to the registry this server answers from
    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Serve until the task is dropped; failed accepts are retried
    pub async fn run(self) -> Result<()> {
        let upgrader = self.listener.upgrader();
        loop {
            let (tcp, peer) = self.listener.next_connection().await;
            let upgrader = upgrader.clone();
            let registry = self.registry.clone();
            tokio::spawn(async move {
                let stream = match upgrader.upgrade(tcp).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!("Rejected connection from {}: {}", peer, e);
                        return;
                    }
                };
                if let Err(e) = serve_connection(stream, peer, &registry).await {
                    warn!("Directory connection from {} failed: {}", peer, e);
                }
            });
        }
    }

    /// Run on a background task
    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            let result = self.run().await;
            if let Err(e) = &result {
                error!("Leader stopped: {}", e);
            }
            result
        })
    }
}

async fn serve_connection(
    mut stream: ChannelStream,
    peer: SocketAddr,
    registry: &Registry,
) -> Result<()> {
    while let Some(frame) = read_frame(&mut stream).await.map_err(TransportError::from)? {
        let payload = match frame {
            Frame::Data(payload) => payload,
            other => {
                return Err(LeaderError::InvalidRequest(format!(
                    "expected a directory request, got {:?}",
                    other.kind()
                )));
            }
        };
        let request: DirectoryRequest = bincode::deserialize(&payload)
            .map_err(|e| LeaderError::InvalidRequest(e.to_string()))?;
        debug!("{} -> {:?}", peer, request);

        let response = registry.handle(request);
        let payload = bincode::serialize(&response).map_err(TransportError::from)?;
        write_frame(&mut stream, &Frame::Data(payload))
            .await
            .map_err(TransportError::from)?;
    }
    Ok(())
}
