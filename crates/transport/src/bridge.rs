//! Typed bridge over raw channels
//!
//! A bridge task sits between a typed tokio queue and a raw channel end and
//! runs every value through a `Codec`. The task is the only writer of its
//! `ChannelStatus`; its result comes back through `Relay::join`.

use crate::channel::{RawSink, RawSource};
use crate::config::queue_capacity;
use crate::error::BridgeError;
use log::{debug, error, info};
use netchan_core::ChannelStatus;
use netchan_ports::Codec;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Handle to a running bridge task
pub struct Relay {
    status: Arc<ChannelStatus>,
    task: JoinHandle<Result<u64, BridgeError>>,
}

impl Relay {
    fn spawn<F>(status: Arc<ChannelStatus>, fut: F) -> Self
    where
        F: std::future::Future<Output = Result<u64, BridgeError>> + Send + 'static,
    {
        Self {
            status,
            task: tokio::spawn(fut),
        }
    }

    pub fn status(&self) -> Arc<ChannelStatus> {
        self.status.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the bridge to stop; returns the number of values it moved
    pub async fn join(self) -> Result<u64, BridgeError> {
        self.task
            .await
            .map_err(|e| BridgeError::Join(e.to_string()))?
    }
}

/// Set of relays that are waited on together
#[derive(Default)]
pub struct RelayGroup {
    relays: Vec<Relay>,
}

impl RelayGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, relay: Relay) {
        self.relays.push(relay);
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    pub fn statuses(&self) -> Vec<Arc<ChannelStatus>> {
        self.relays.iter().map(Relay::status).collect()
    }

    /// Wait until every relay has stopped.
    ///
    /// All relays are awaited even when one fails; the first error is
    /// returned, otherwise the per-relay counts in insertion order.
    pub async fn wait(self) -> Result<Vec<u64>, BridgeError> {
        let mut counts = Vec::with_capacity(self.relays.len());
        let mut first_error = None;

        for relay in self.relays {
            match relay.join().await {
                Ok(n) => counts.push(n),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(counts),
        }
    }
}

/// Decode every message of `raw` into `T` and forward it in order.
///
/// The returned queue holds up to `capacity` decoded values (0 keeps one in
/// flight). It ends when the raw channel ends; whether that end was clean is
/// reported by the relay, which fails with `BridgeError::Decode` on the first
/// message the codec rejects.
pub fn bridge_receive_to_typed<T, S, C>(
    mut raw: S,
    codec: C,
    capacity: usize,
) -> (mpsc::Receiver<T>, Relay)
where
    T: Send + 'static,
    S: RawSource + 'static,
    C: Codec<T> + 'static,
{
    let status = Arc::new(ChannelStatus::new(format!("decode:{}", raw.name())));
    let (tx, rx) = mpsc::channel(queue_capacity(capacity));

    let relay = Relay::spawn(status.clone(), async move {
        status.report_start();
        let mut delivered = 0u64;

        let result = loop {
            let bytes = match raw.recv().await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => break Ok(delivered),
                Err(e) => break Err(BridgeError::from(e)),
            };
            let value = match codec.decode(&bytes) {
                Ok(value) => value,
                Err(source) => break Err(BridgeError::Decode { delivered, source }),
            };
            if tx.send(value).await.is_err() {
                break Err(BridgeError::OutputClosed);
            }
            delivered += 1;
            status.report_add(1);
        };

        match &result {
            Ok(n) => {
                debug!("{}: {} values decoded via {}", status.label(), n, codec.name());
                status.report_close();
            }
            Err(e) => {
                error!("{}: bridge stopped: {}", status.label(), e);
                status.report_failure(e.to_string());
            }
        }
        result
    });

    (rx, relay)
}

/// Encode every value from `input` and write it to `raw` in order.
///
/// When `input` is exhausted the raw channel is closed and the relay waits
/// for the consumer's acknowledgement. An encode failure aborts the raw
/// channel so the consumer sees a broken stream rather than a clean end.
pub fn bridge_typed_to_raw<T, S, C>(mut input: mpsc::Receiver<T>, mut raw: S, codec: C) -> Relay
where
    T: Send + 'static,
    S: RawSink + 'static,
    C: Codec<T> + 'static,
{
    let status = Arc::new(ChannelStatus::new(format!("encode:{}", raw.name())));

    Relay::spawn(status.clone(), async move {
        status.report_start();
        let mut delivered = 0u64;

        let result = async {
            while let Some(value) = input.recv().await {
                let bytes = match codec.encode(&value) {
                    Ok(bytes) => bytes,
                    Err(source) => {
                        raw.abort(&source.to_string()).await;
                        return Err(BridgeError::Encode { delivered, source });
                    }
                };
                if let Err(e) = raw.send(bytes).await {
                    raw.abort(&e.to_string()).await;
                    return Err(BridgeError::from(e));
                }
                delivered += 1;
                status.report_add(1);
            }
            raw.close().await?;
            Ok::<u64, BridgeError>(delivered)
        }
        .await;

        match &result {
            Ok(n) => {
                info!("{}: {} values written via {}", status.label(), n, codec.name());
                status.report_close();
            }
            Err(e) => {
                error!("{}: bridge stopped: {}", status.label(), e);
                status.report_failure(e.to_string());
            }
        }
        result
    })
}
