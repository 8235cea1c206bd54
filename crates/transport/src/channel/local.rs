//! In-process raw channel pair
//!
//! Same semantics as a network handle pair without the network: bounded,
//! FIFO, explicit close (a sink dropped without `close` leaves the source a
//! broken stream). Used to run the typed bridge inside one process.

use crate::channel::{RawSink, RawSource};
use crate::config::queue_capacity;
use crate::error::TransportError;
use crate::relay::MessageResult;
use async_trait::async_trait;
use netchan_core::ChannelName;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// Producer end of a local pair
pub struct LocalSink {
    name: ChannelName,
    tx: Option<mpsc::Sender<MessageResult>>,
    sent: u64,
    closed: Arc<AtomicBool>,
}

/// Consumer end of a local pair
pub struct LocalSource {
    name: ChannelName,
    rx: mpsc::Receiver<MessageResult>,
    failed: bool,
    closed: Arc<AtomicBool>,
}

/// Create a connected sink/source pair holding up to `buffer_size` messages
pub fn local_pair(name: ChannelName, buffer_size: usize) -> (LocalSink, LocalSource) {
    let (tx, rx) = mpsc::channel(queue_capacity(buffer_size));
    let closed = Arc::new(AtomicBool::new(false));
    (
        LocalSink {
            name: name.clone(),
            tx: Some(tx),
            sent: 0,
            closed: closed.clone(),
        },
        LocalSource {
            name,
            rx,
            failed: false,
            closed,
        },
    )
}

#[async_trait]
impl RawSink for LocalSink {
    async fn send(&mut self, msg: Vec<u8>) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::ChannelClosed)?;
        tx.send(Ok(msg))
            .await
            .map_err(|_| TransportError::ChannelClosed)?;
        self.sent += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<u64, TransportError> {
        let tx = self.tx.take().ok_or(TransportError::ChannelClosed)?;
        self.closed.store(true, Ordering::Release);
        drop(tx);
        Ok(self.sent)
    }

    async fn abort(&mut self, reason: &str) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(TransportError::Aborted(reason.to_string()))).await;
        }
    }

    fn name(&self) -> &ChannelName {
        &self.name
    }
}

#[async_trait]
impl RawSource for LocalSource {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match self.rx.recv().await {
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(e)) => {
                self.failed = true;
                Err(e)
            }
            None if self.failed => Err(TransportError::ChannelClosed),
            None if self.closed.load(Ordering::Acquire) => Ok(None),
            None => {
                self.failed = true;
                Err(TransportError::BrokenStream)
            }
        }
    }

    fn name(&self) -> &ChannelName {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn name() -> ChannelName {
        ChannelName::new("local").unwrap()
    }

    #[tokio::test]
    async fn test_local_pair_basic() {
        let (mut sink, mut source) = local_pair(name(), 10);

        sink.send(b"hello".to_vec()).await.unwrap();
        sink.send(b"world".to_vec()).await.unwrap();
        assert_eq!(sink.close().await.unwrap(), 2);

        assert_eq!(source.recv().await.unwrap(), Some(b"hello".to_vec()));
        assert_eq!(source.recv().await.unwrap(), Some(b"world".to_vec()));
        assert_eq!(source.recv().await.unwrap(), None);
        assert_eq!(source.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_local_backpressure() {
        let (mut sink, _source) = local_pair(name(), 2);

        sink.send(b"1".to_vec()).await.unwrap();
        sink.send(b"2".to_vec()).await.unwrap();

        // Third write must wait for the consumer, not drop
        let blocked = tokio::time::timeout(Duration::from_millis(50), sink.send(b"3".to_vec())).await;
        assert!(blocked.is_err());
    }

    #[tokio::test]
    async fn test_local_disconnect() {
        let (mut sink, source) = local_pair(name(), 10);
        drop(source);

        let result = sink.send(b"data".to_vec()).await;
        assert!(matches!(result, Err(TransportError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_local_drop_without_close_breaks_stream() {
        let (mut sink, mut source) = local_pair(name(), 10);
        sink.send(b"partial".to_vec()).await.unwrap();
        drop(sink);

        assert_eq!(source.recv().await.unwrap(), Some(b"partial".to_vec()));
        assert!(matches!(source.recv().await, Err(TransportError::BrokenStream)));
        assert!(matches!(
            source.recv().await,
            Err(TransportError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_local_abort() {
        let (mut sink, mut source) = local_pair(name(), 10);
        sink.abort("boom").await;

        assert!(matches!(source.recv().await, Err(TransportError::Aborted(_))));
        assert!(matches!(
            source.recv().await,
            Err(TransportError::ChannelClosed)
        ));
    }
}
