//! Agent server
//!
//! Accepts channel sessions, hosts their queues and keeps the leader
//! informed. Every session runs on its own task while holding one executor
//! slot.

use crate::config::AgentConfig;
use crate::error::Result;
use crate::executor::ExecutorPool;
use crate::hosted::{HostedChannel, HostedChannels};
use log::{debug, error, info, warn};
use netchan_core::{AgentId, AgentInfo, Direction, Endpoint};
use netchan_ports::Directory;
use netchan_transport::{
    ChannelListener, DirectoryClient, IncomingChannel, pump_inbound, pump_outbound,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// State shared by every session task
struct Shared {
    id: AgentId,
    config: AgentConfig,
    advertise: Endpoint,
    hosted: HostedChannels,
    pool: ExecutorPool,
    directory: Option<DirectoryClient>,
    /// Orders register/deregister calls so a retiring generation cannot
    /// unpublish the name its successor just published
    publishing: Mutex<()>,
}

/// Bound agent, ready to serve
pub struct AgentServer {
    listener: ChannelListener,
    shared: Arc<Shared>,
}

impl AgentServer {
    /// Prepare the scratch directory and bind the listener
    pub async fn bind(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.dir)?;

        let listener = ChannelListener::bind(&config.listen, &config.transport).await?;
        let advertise = match &config.advertise {
            Some(endpoint) => endpoint.clone(),
            None => listener.local_endpoint()?,
        };
        let directory = config
            .leader
            .clone()
            .map(|leader| DirectoryClient::new(leader, config.transport.clone()));

        let shared = Shared {
            id: AgentId::new(),
            advertise,
            hosted: HostedChannels::new(config.channel_buffer),
            pool: ExecutorPool::new(config.resources),
            directory,
            publishing: Mutex::new(()),
            config,
        };
        info!(
            "Agent {} listening on {} (advertised as {}, {} executors of {} MB, scratch {})",
            shared.id,
            listener.local_addr()?,
            shared.advertise,
            shared.config.resources.max_executors,
            shared.config.resources.memory_per_executor_mb(),
            shared.config.dir.display()
        );

        Ok(Self {
            listener,
            shared: Arc::new(shared),
        })
    }

    pub fn id(&self) -> AgentId {
        self.shared.id
    }

    /// Endpoint producers and consumers should dial
    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.advertise
    }

    pub fn hosted(&self) -> HostedChannels {
        self.shared.hosted.clone()
    }

    pub fn executors(&self) -> ExecutorPool {
        self.shared.pool.clone()
    }

    pub fn info(&self) -> AgentInfo {
        self.shared.info()
    }

    /// Serve until the task is dropped; failed accepts are retried
    pub async fn run(self) -> Result<()> {
        let heartbeat = self.shared.directory.clone().map(|directory| {
            let shared = self.shared.clone();
            tokio::spawn(heartbeat_loop(shared, directory))
        });

        let result = self.accept_loop().await;
        if let Some(task) = heartbeat {
            task.abort();
        }
        result
    }

    /// Run on a background task
    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            let result = self.run().await;
            if let Err(e) = &result {
                error!("Agent stopped: {}", e);
            }
            result
        })
    }

    async fn accept_loop(&self) -> Result<()> {
        let upgrader = self.listener.upgrader();
        loop {
            let (tcp, peer) = self.listener.next_connection().await;
            let upgrader = upgrader.clone();
            let shared = self.shared.clone();
            tokio::spawn(async move {
                match upgrader.handshake(tcp, peer).await {
                    Ok(incoming) => shared.serve(incoming).await,
                    Err(e) => warn!("Handshake with {} failed: {}", peer, e),
                }
            });
        }
    }
}

impl Shared {
    fn info(&self) -> AgentInfo {
        AgentInfo {
            id: self.id,
            endpoint: self.advertise.clone(),
            data_center: self.config.data_center.clone(),
            rack: self.config.rack.clone(),
            resources: self.config.resources,
            executors_in_use: self.pool.in_use(),
            hosted_channels: self.hosted.len(),
        }
    }

    async fn serve(&self, incoming: IncomingChannel) {
        let name = incoming.name().clone();
        let Some(_slot) = self.pool.try_acquire() else {
            warn!("Rejecting {} for {}: no free executor", name, incoming.peer());
            let _ = incoming.reject("no free executor slot").await;
            return;
        };

        let result = match incoming.direction() {
            Direction::Send => self.host_producer(incoming).await,
            Direction::Receive => self.host_consumer(incoming).await,
        };
        if let Err(e) = result {
            error!("Hosted channel {} relay failed: {}", name, e);
        }
    }

    /// Relay a producer's frames into the hosted queue
    async fn host_producer(&self, incoming: IncomingChannel) -> Result<()> {
        let channel = self.hosted.get_or_create(incoming.name());
        let Some(tx) = channel.attach_producer() else {
            warn!("Rejecting second producer for {}", channel.name());
            incoming.reject("channel already has a producer").await?;
            return Ok(());
        };

        if incoming.announce() {
            if let Err(e) = self.announce(&channel).await {
                warn!("Cannot publish {}: {}", channel.name(), e);
                channel.release_producer(tx);
                self.hosted.remove_if_idle(&channel);
                incoming.reject(&e.to_string()).await?;
                return Ok(());
            }
        }

        let mut stream = match incoming.accept().await {
            Ok(stream) => stream,
            Err(e) => {
                channel.mark_producer_done();
                let _ = tx.send(Err(e.clone())).await;
                return Err(e.into());
            }
        };
        info!("Producer attached to {}", channel.name());
        let result = pump_inbound(&mut stream, &tx, &channel.inbound()).await;
        channel.mark_producer_done();
        match result {
            Ok(n) => {
                debug!("Producer of {} closed after {} messages", channel.name(), n);
                Ok(())
            }
            Err(e) => {
                channel.inbound().report_failure(e.to_string());
                // The consumer sees the failure as a broken stream
                let _ = tx.send(Err(e.clone())).await;
                Err(e.into())
            }
        }
    }

    /// Stream the hosted queue out to a consumer, then retire the channel
    async fn host_consumer(&self, incoming: IncomingChannel) -> Result<()> {
        let channel = self.hosted.get_or_create(incoming.name());
        let Some(mut rx) = channel.attach_consumer() else {
            warn!("Rejecting second consumer for {}", channel.name());
            incoming.reject("channel already has a consumer").await?;
            return Ok(());
        };

        let mut stream = incoming.accept().await?;
        info!("Consumer attached to {}", channel.name());
        let result = pump_outbound(&mut stream, &mut rx, &channel.outbound()).await;
        if let Err(e) = &result {
            channel.outbound().report_failure(e.to_string());
        }

        self.retire(&channel).await;
        let sent = result?;
        info!("Channel {} delivered {} messages", channel.name(), sent);
        Ok(())
    }

    async fn announce(&self, channel: &HostedChannel) -> Result<()> {
        let Some(directory) = &self.directory else {
            return Ok(());
        };
        let _publishing = self.publishing.lock().await;
        directory.register(channel.name(), &self.advertise).await?;
        channel.mark_announced();
        Ok(())
    }

    /// Drop a delivered channel and unpublish its name, unless a newer
    /// generation of the same name is already hosted here
    async fn retire(&self, channel: &Arc<HostedChannel>) {
        self.hosted.remove(channel);
        if !channel.is_announced() {
            return;
        }
        let Some(directory) = &self.directory else {
            return;
        };

        let _publishing = self.publishing.lock().await;
        if let Some(successor) = self.hosted.get(channel.name()) {
            // The mapping points at this agent either way; the successor
            // unpublishes it when it retires
            debug!("Channel {} handed to its next generation", channel.name());
            successor.mark_announced();
            return;
        }
        if let Err(e) = directory.deregister(channel.name()).await {
            warn!("Cannot deregister {}: {}", channel.name(), e);
        }
    }
}

async fn heartbeat_loop(shared: Arc<Shared>, directory: DirectoryClient) {
    let mut ticker = tokio::time::interval(shared.config.heartbeat_interval());
    loop {
        ticker.tick().await;
        match directory.heartbeat(&shared.info()).await {
            Ok(()) => debug!("Heartbeat sent to {}", directory.leader()),
            Err(e) => warn!("Heartbeat to {} failed: {}", directory.leader(), e),
        }
    }
}
