//! In-memory channel registry and agent membership

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, info};
use netchan_core::{AgentId, AgentInfo, ChannelName, Endpoint};
use netchan_ports::{Directory, DirectoryError, DirectoryResult};
use netchan_transport::wire::{DirectoryRequest, DirectoryResponse};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct AgentRecord {
    info: AgentInfo,
    last_seen: Instant,
}

/// Name → endpoint map plus the last heartbeat of every agent
///
/// Cheap to clone; clones share the same maps.
#[derive(Clone)]
pub struct Registry {
    channels: Arc<DashMap<ChannelName, Endpoint>>,
    agents: Arc<DashMap<AgentId, AgentRecord>>,
    agent_timeout: Duration,
}

impl Registry {
    pub fn new(agent_timeout: Duration) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            agents: Arc::new(DashMap::new()),
            agent_timeout,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Registered channels, sorted by name
    pub fn channels(&self) -> Vec<(ChannelName, Endpoint)> {
        let mut channels: Vec<_> = self
            .channels
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        channels.sort_by(|a, b| a.0.cmp(&b.0));
        channels
    }

    /// Record an agent heartbeat
    pub fn heartbeat(&self, info: AgentInfo) {
        let id = info.id;
        let record = AgentRecord {
            info,
            last_seen: Instant::now(),
        };
        if self.agents.insert(id, record).is_none() {
            info!("Agent {} joined", id);
        }
    }

    /// Agents heard from within the timeout; stale ones are dropped
    pub fn list_agents(&self) -> Vec<AgentInfo> {
        self.prune(Instant::now());
        let mut agents: Vec<AgentInfo> = self.agents.iter().map(|e| e.value().info.clone()).collect();
        agents.sort_by(|a, b| a.endpoint.to_string().cmp(&b.endpoint.to_string()));
        agents
    }

    fn prune(&self, now: Instant) {
        let timeout = self.agent_timeout;
        self.agents.retain(|id, record| {
            let alive = now.duration_since(record.last_seen) <= timeout;
            if !alive {
                info!("Agent {} timed out", id);
            }
            alive
        });
    }

    /// Answer one directory request
    pub fn handle(&self, request: DirectoryRequest) -> DirectoryResponse {
        match request {
            DirectoryRequest::Register { name, endpoint } => {
                to_response(self.insert(name, endpoint).map(|_| DirectoryResponse::Ok))
            }
            DirectoryRequest::Resolve { name } => {
                to_response(self.lookup(&name).map(DirectoryResponse::Endpoint))
            }
            DirectoryRequest::Deregister { name } => {
                self.remove(&name);
                DirectoryResponse::Ok
            }
            DirectoryRequest::Heartbeat(info) => {
                self.heartbeat(info);
                DirectoryResponse::Ok
            }
            DirectoryRequest::ListAgents => DirectoryResponse::Agents(self.list_agents()),
        }
    }

    fn insert(&self, name: ChannelName, endpoint: Endpoint) -> DirectoryResult<()> {
        match self.channels.entry(name) {
            Entry::Occupied(existing) => {
                if existing.get() == &endpoint {
                    return Ok(());
                }
                Err(DirectoryError::AlreadyRegistered {
                    name: existing.key().clone(),
                    existing: existing.get().clone(),
                })
            }
            Entry::Vacant(slot) => {
                info!("Registered {} at {}", slot.key(), endpoint);
                slot.insert(endpoint);
                Ok(())
            }
        }
    }

    fn lookup(&self, name: &ChannelName) -> DirectoryResult<Endpoint> {
        self.channels
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| DirectoryError::NotFound(name.clone()))
    }

    fn remove(&self, name: &ChannelName) {
        if self.channels.remove(name).is_some() {
            info!("Deregistered {}", name);
        } else {
            debug!("Deregister of unknown channel {}", name);
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Duration::from_secs(15))
    }
}

fn to_response(result: DirectoryResult<DirectoryResponse>) -> DirectoryResponse {
    match result {
        Ok(response) => response,
        Err(DirectoryError::NotFound(name)) => DirectoryResponse::NotFound(name),
        Err(DirectoryError::AlreadyRegistered { name, existing }) => {
            DirectoryResponse::AlreadyRegistered { name, existing }
        }
        Err(DirectoryError::Unavailable(reason)) => DirectoryResponse::Failed(reason),
    }
}

#[async_trait]
impl Directory for Registry {
    async fn register(&self, name: &ChannelName, endpoint: &Endpoint) -> DirectoryResult<()> {
        self.insert(name.clone(), endpoint.clone())
    }

    async fn resolve(&self, name: &ChannelName) -> DirectoryResult<Endpoint> {
        self.lookup(name)
    }

    async fn deregister(&self, name: &ChannelName) -> DirectoryResult<()> {
        self.remove(name);
        Ok(())
    }
}
