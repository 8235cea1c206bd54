//! Network channel handles
//!
//! Each handle owns one connection through a relay task. The caller talks to
//! the relay over a bounded queue, so a full queue (plus the socket buffers
//! behind it) is what blocks a fast producer.

use crate::channel::{RawSink, RawSource};
use crate::error::TransportError;
use crate::net::ChannelStream;
use crate::relay::{MessageResult, pump_inbound, pump_outbound};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use netchan_core::{ChannelName, ChannelState, ChannelStatus, StateCell};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Producer side of an open channel
pub struct SendHandle {
    name: ChannelName,
    tx: Option<mpsc::Sender<MessageResult>>,
    relay: Option<JoinHandle<Result<u64, TransportError>>>,
    state: Arc<StateCell>,
    status: Arc<ChannelStatus>,
}

impl SendHandle {
    /// Start the relay for an accepted session. `stream` must be past the handshake.
    pub(crate) fn spawn(
        name: ChannelName,
        stream: ChannelStream,
        capacity: usize,
        buffered: bool,
        state: Arc<StateCell>,
    ) -> Self {
        let status = Arc::new(ChannelStatus::new(format!("send:{}", name)));
        let (tx, mut rx) = mpsc::channel(capacity);

        let _ = state.advance(ChannelState::Open);
        if buffered {
            let _ = state.advance(ChannelState::Buffered);
        }

        let relay = tokio::spawn({
            let name = name.clone();
            let state = state.clone();
            let status = status.clone();
            async move {
                let mut stream = stream;
                let result = pump_outbound(&mut stream, &mut rx, &status).await;
                state.close();
                match &result {
                    Ok(sent) => info!("Channel {} closed after {} messages", name, sent),
                    Err(e) => {
                        error!("Send relay for channel {} failed: {}", name, e);
                        status.report_failure(e.to_string());
                    }
                }
                result
            }
        });

        Self {
            name,
            tx: Some(tx),
            relay: Some(relay),
            state,
            status,
        }
    }

    pub fn name(&self) -> &ChannelName {
        &self.name
    }

    pub fn state(&self) -> ChannelState {
        self.state.get()
    }

    /// Messages written to the network so far
    pub fn status(&self) -> Arc<ChannelStatus> {
        self.status.clone()
    }

    /// Queue one message for the relay.
    ///
    /// Fails with `ChannelClosed` once the handle was closed or the relay
    /// stopped; `close()` then reports why the relay stopped.
    pub async fn send(&self, msg: Vec<u8>) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::ChannelClosed)?;
        tx.send(Ok(msg))
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }

    /// End the stream and wait for the consumer side to acknowledge it
    pub async fn close(&mut self) -> Result<u64, TransportError> {
        let _ = self.state.advance(ChannelState::Closing);
        self.tx.take();
        let relay = self.relay.take().ok_or(TransportError::ChannelClosed)?;
        let result = relay
            .await
            .map_err(|e| TransportError::Io(format!("send relay task failed: {}", e)))?;
        self.state.close();
        result
    }

    /// Tear the connection down without an end-of-stream marker
    pub async fn abort(&mut self, reason: &str) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(TransportError::Aborted(reason.to_string()))).await;
        }
        if let Some(relay) = self.relay.take() {
            let _ = relay.await;
        }
        self.state.close();
    }
}

/// A handle dropped without `close()` or `abort()` must not read as a complete
/// stream, so the relay is told to stop without a `Close` frame.
impl Drop for SendHandle {
    fn drop(&mut self) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        warn!("Send handle for channel {} dropped before close", self.name);
        let reason = "send handle dropped before close";
        if tx.try_send(Err(TransportError::Aborted(reason.to_string()))).is_err() {
            // Queue full or relay gone: cut the connection under it
            if let Some(relay) = self.relay.take() {
                relay.abort();
            }
            self.status.report_failure(reason);
            self.state.close();
        }
    }
}

#[async_trait]
impl RawSink for SendHandle {
    async fn send(&mut self, msg: Vec<u8>) -> Result<(), TransportError> {
        SendHandle::send(self, msg).await
    }

    async fn close(&mut self) -> Result<u64, TransportError> {
        SendHandle::close(self).await
    }

    async fn abort(&mut self, reason: &str) {
        SendHandle::abort(self, reason).await
    }

    fn name(&self) -> &ChannelName {
        &self.name
    }
}

/// Consumer side of an open channel
pub struct ReceiveHandle {
    name: ChannelName,
    rx: mpsc::Receiver<MessageResult>,
    state: Arc<StateCell>,
    status: Arc<ChannelStatus>,
    failed: bool,
}

impl ReceiveHandle {
    /// Start the relay for an accepted session. `stream` must be past the handshake.
    pub(crate) fn spawn(
        name: ChannelName,
        stream: ChannelStream,
        capacity: usize,
        buffered: bool,
        state: Arc<StateCell>,
    ) -> Self {
        let status = Arc::new(ChannelStatus::new(format!("receive:{}", name)));
        let (tx, rx) = mpsc::channel(capacity);

        let _ = state.advance(ChannelState::Open);
        if buffered {
            let _ = state.advance(ChannelState::Buffered);
        }

        tokio::spawn({
            let name = name.clone();
            let state = state.clone();
            let status = status.clone();
            async move {
                let mut stream = stream;
                match pump_inbound(&mut stream, &tx, &status).await {
                    Ok(received) => {
                        debug!("Channel {} drained after {} messages", name, received);
                        let _ = state.advance(ChannelState::Closing);
                    }
                    Err(e) => {
                        error!("Receive relay for channel {} failed: {}", name, e);
                        status.report_failure(e.to_string());
                        state.close();
                        let _ = tx.send(Err(e)).await;
                    }
                }
            }
        });

        Self {
            name,
            rx,
            state,
            status,
            failed: false,
        }
    }

    pub fn name(&self) -> &ChannelName {
        &self.name
    }

    pub fn state(&self) -> ChannelState {
        self.state.get()
    }

    /// Messages taken off the network so far
    pub fn status(&self) -> Arc<ChannelStatus> {
        self.status.clone()
    }

    /// Next message in write order; `Ok(None)` once the producer closed.
    ///
    /// After an error every further call fails with `ChannelClosed`.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match self.rx.recv().await {
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(e)) => {
                self.failed = true;
                self.state.close();
                Err(e)
            }
            None if self.failed => Err(TransportError::ChannelClosed),
            None => {
                self.state.close();
                Ok(None)
            }
        }
    }

    /// Read until end of stream
    pub async fn collect(&mut self) -> Result<Vec<Vec<u8>>, TransportError> {
        let mut messages = Vec::new();
        while let Some(msg) = self.recv().await? {
            messages.push(msg);
        }
        Ok(messages)
    }
}

#[async_trait]
impl RawSource for ReceiveHandle {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        ReceiveHandle::recv(self).await
    }

    fn name(&self) -> &ChannelName {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn pair(capacity: usize) -> (SendHandle, ReceiveHandle) {
        let name = ChannelName::new("X").unwrap();
        let (left, right) = duplex(4096);
        let send = SendHandle::spawn(
            name.clone(),
            Box::new(left),
            capacity,
            false,
            Arc::new(StateCell::new()),
        );
        let recv = ReceiveHandle::spawn(
            name,
            Box::new(right),
            capacity,
            true,
            Arc::new(StateCell::new()),
        );
        (send, recv)
    }

    #[tokio::test]
    async fn test_close_propagates_after_messages() {
        let (mut send, mut recv) = pair(4);
        assert_eq!(send.state(), ChannelState::Open);
        assert_eq!(recv.state(), ChannelState::Buffered);

        let reader = tokio::spawn(async move {
            let msgs = recv.collect().await.unwrap();
            // No further reads succeed once the end was observed
            assert_eq!(recv.recv().await.unwrap(), None);
            assert_eq!(recv.state(), ChannelState::Closed);
            msgs
        });

        for m in ["a", "b", "c"] {
            send.send(m.as_bytes().to_vec()).await.unwrap();
        }
        assert_eq!(send.close().await.unwrap(), 3);
        assert_eq!(send.state(), ChannelState::Closed);
        assert!(send.status().is_closed());
        assert_eq!(send.status().count(), 3);

        let msgs = reader.await.unwrap();
        assert_eq!(msgs, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (mut send, mut recv) = pair(1);
        let reader = tokio::spawn(async move { recv.collect().await });

        send.close().await.unwrap();
        assert!(matches!(
            send.send(b"late".to_vec()).await,
            Err(TransportError::ChannelClosed)
        ));
        assert!(matches!(send.close().await, Err(TransportError::ChannelClosed)));
        assert!(reader.await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drop_without_close_breaks_stream() {
        let (send, mut recv) = pair(4);
        send.send(b"a".to_vec()).await.unwrap();
        drop(send);

        assert_eq!(recv.recv().await.unwrap(), Some(b"a".to_vec()));
        assert!(matches!(
            recv.recv().await,
            Err(TransportError::BrokenStream)
        ));
        assert!(!recv.status().is_closed());
    }

    #[tokio::test]
    async fn test_drop_with_full_queue_breaks_stream() {
        let (send, mut recv) = pair(1);
        // Fill the relay queue so the abort marker cannot be queued
        for _ in 0..64 {
            if tokio::time::timeout(
                std::time::Duration::from_millis(20),
                send.send(vec![0u8; 1024]),
            )
            .await
            .is_err()
            {
                break;
            }
        }
        drop(send);

        let result = loop {
            match recv.recv().await {
                Ok(Some(_)) => continue,
                other => break other,
            }
        };
        assert!(matches!(result, Err(TransportError::BrokenStream)));
    }

    #[tokio::test]
    async fn test_abort_surfaces_as_broken_stream() {
        let (mut send, mut recv) = pair(4);
        send.send(b"a".to_vec()).await.unwrap();
        send.abort("producer gave up").await;

        assert_eq!(recv.recv().await.unwrap(), Some(b"a".to_vec()));
        assert!(matches!(
            recv.recv().await,
            Err(TransportError::BrokenStream)
        ));
        assert!(matches!(
            recv.recv().await,
            Err(TransportError::ChannelClosed)
        ));
        assert!(recv.status().is_failed());
    }
}
