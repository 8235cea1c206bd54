//! Frame pumps shared by client handles and hosting servers
//!
//! Both directions follow the same session tail: the emitting side writes
//! `Data*` then `Close`; the consuming side answers `Ack`. A stream that
//! ends before `Close` is a broken stream.

use crate::error::TransportError;
use crate::wire::{Frame, WireError, read_frame, write_frame};
use log::{debug, trace};
use netchan_core::ChannelStatus;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// One raw message, or the error that ended the stream feeding it
pub type MessageResult = Result<Vec<u8>, TransportError>;

/// Emit every message from `source` over `stream`, then close and await the ack.
///
/// An `Err` from `source` aborts the session without a `Close` frame, so the
/// peer observes a broken stream instead of a clean end.
pub async fn pump_outbound<S>(
    stream: &mut S,
    source: &mut mpsc::Receiver<MessageResult>,
    status: &ChannelStatus,
) -> Result<u64, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    status.report_start();
    let mut sent = 0u64;

    while let Some(message) = source.recv().await {
        let data = message?;
        trace!("{}: writing {} bytes", status.label(), data.len());
        write_frame(stream, &Frame::Data(data)).await?;
        sent += 1;
        status.report_add(1);
    }

    debug!("{}: {} messages written, closing", status.label(), sent);
    write_frame(stream, &Frame::Close).await?;

    match read_frame(stream).await? {
        Some(Frame::Ack) => {}
        Some(other) => {
            return Err(TransportError::Protocol(format!(
                "expected Ack, got {:?}",
                other.kind()
            )));
        }
        None => return Err(TransportError::BrokenStream),
    }

    let _ = stream.shutdown().await;
    status.report_close();
    Ok(sent)
}

/// Deliver every `Data` frame from `stream` into `sink` until `Close`, then ack.
///
/// Waiting on a full `sink` stops reading from the socket, which is what
/// pushes back on a fast producer.
pub async fn pump_inbound<S>(
    stream: &mut S,
    sink: &mpsc::Sender<MessageResult>,
    status: &ChannelStatus,
) -> Result<u64, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    status.report_start();
    let mut received = 0u64;

    loop {
        match read_frame(stream).await.map_err(broken_on_truncation)? {
            Some(Frame::Data(data)) => {
                trace!("{}: read {} bytes", status.label(), data.len());
                sink.send(Ok(data))
                    .await
                    .map_err(|_| TransportError::ChannelClosed)?;
                received += 1;
                status.report_add(1);
            }
            Some(Frame::Close) => break,
            Some(other) => {
                return Err(TransportError::Protocol(format!(
                    "unexpected {:?} inside a channel stream",
                    other.kind()
                )));
            }
            None => return Err(TransportError::BrokenStream),
        }
    }

    debug!("{}: close after {} messages, acking", status.label(), received);
    write_frame(stream, &Frame::Ack).await?;
    let _ = stream.shutdown().await;
    status.report_close();
    Ok(received)
}

/// A peer vanishing mid-frame (or without a TLS close) is a broken stream
fn broken_on_truncation(err: WireError) -> TransportError {
    match err {
        WireError::Truncated => TransportError::BrokenStream,
        other => other.into(),
    }
}
