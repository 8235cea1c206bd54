//! Channels hosted by this agent
//!
//! A hosted channel is a bounded in-memory queue between one producer
//! connection and one consumer connection. Either side may attach first.
//!
//! Once its producer has finished and its consumer is draining it, a channel
//! no longer owns its name: the next open of that name starts a new
//! generation while the old one drains and retires.

use dashmap::DashMap;
use log::debug;
use netchan_core::{ChannelName, ChannelStatus, StatusSnapshot};
use netchan_transport::{MessageResult, queue_capacity};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// Queue ends not yet claimed by a connection
struct Ends {
    producer: Option<mpsc::Sender<MessageResult>>,
    consumer: Option<mpsc::Receiver<MessageResult>>,
}

pub struct HostedChannel {
    name: ChannelName,
    ends: Mutex<Ends>,
    inbound: Arc<ChannelStatus>,
    outbound: Arc<ChannelStatus>,
    announced: AtomicBool,
    producer_done: AtomicBool,
}

impl HostedChannel {
    fn new(name: ChannelName, buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity(buffer));
        Self {
            inbound: Arc::new(ChannelStatus::new(format!("hosted-in:{}", name))),
            outbound: Arc::new(ChannelStatus::new(format!("hosted-out:{}", name))),
            name,
            ends: Mutex::new(Ends {
                producer: Some(tx),
                consumer: Some(rx),
            }),
            announced: AtomicBool::new(false),
            producer_done: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &ChannelName {
        &self.name
    }

    /// Claim the producer end; `None` if a producer already attached
    pub fn attach_producer(&self) -> Option<mpsc::Sender<MessageResult>> {
        self.lock().producer.take()
    }

    /// Give back a producer end that was claimed but never used
    pub fn release_producer(&self, tx: mpsc::Sender<MessageResult>) {
        self.lock().producer = Some(tx);
    }

    /// Claim the consumer end; `None` if a consumer already attached
    pub fn attach_consumer(&self) -> Option<mpsc::Receiver<MessageResult>> {
        self.lock().consumer.take()
    }

    /// The producer connection ended, cleanly or not
    pub fn mark_producer_done(&self) {
        self.producer_done.store(true, Ordering::Release);
    }

    /// Producer finished and a consumer holds the queue: nothing new can
    /// arrive, so the name is free for the next generation
    pub fn is_draining(&self) -> bool {
        self.producer_done.load(Ordering::Acquire) && self.lock().consumer.is_none()
    }

    /// Neither side has attached yet
    pub fn is_idle(&self) -> bool {
        let ends = self.lock();
        ends.producer.is_some() && ends.consumer.is_some()
    }

    pub fn inbound(&self) -> Arc<ChannelStatus> {
        self.inbound.clone()
    }

    pub fn outbound(&self) -> Arc<ChannelStatus> {
        self.outbound.clone()
    }

    pub fn mark_announced(&self) {
        self.announced.store(true, Ordering::Release);
    }

    pub fn is_announced(&self) -> bool {
        self.announced.load(Ordering::Acquire)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Ends> {
        // The guarded section never panics, so a poisoned lock still holds valid ends
        self.ends.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// All channels hosted by one agent
#[derive(Clone)]
pub struct HostedChannels {
    channels: Arc<DashMap<ChannelName, Arc<HostedChannel>>>,
    buffer: usize,
}

impl HostedChannels {
    pub fn new(buffer: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            buffer,
        }
    }

    /// The live channel called `name`, created on first use.
    ///
    /// A draining channel is replaced by a fresh one; whoever still holds the
    /// old `Arc` finishes with it undisturbed.
    pub fn get_or_create(&self, name: &ChannelName) -> Arc<HostedChannel> {
        let mut entry = self.channels.entry(name.clone()).or_insert_with(|| {
            debug!("Hosting new channel {}", name);
            Arc::new(HostedChannel::new(name.clone(), self.buffer))
        });
        if entry.value().is_draining() {
            debug!("Channel {} is draining, hosting the next generation", name);
            *entry.value_mut() = Arc::new(HostedChannel::new(name.clone(), self.buffer));
        }
        entry.value().clone()
    }

    /// The live channel called `name`, if any
    pub fn get(&self, name: &ChannelName) -> Option<Arc<HostedChannel>> {
        self.channels.get(name).map(|e| e.value().clone())
    }

    /// Drop `channel` if it is still the one registered under its name
    pub fn remove(&self, channel: &Arc<HostedChannel>) {
        self.channels
            .remove_if(channel.name(), |_, current| Arc::ptr_eq(current, channel));
    }

    /// Drop `channel` if no connection ever attached to it
    pub fn remove_if_idle(&self, channel: &Arc<HostedChannel>) {
        self.channels.remove_if(channel.name(), |_, current| {
            Arc::ptr_eq(current, channel) && current.is_idle()
        });
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Hosted channel names, sorted
    pub fn names(&self) -> Vec<ChannelName> {
        let mut names: Vec<_> = self.channels.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Producer-side and consumer-side progress of every hosted channel
    pub fn snapshots(&self) -> Vec<(StatusSnapshot, StatusSnapshot)> {
        self.channels
            .iter()
            .map(|e| (e.value().inbound.snapshot(), e.value().outbound.snapshot()))
            .collect()
    }
}
