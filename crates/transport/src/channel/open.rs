//! Opening channels in discovered and direct mode
//!
//! Discovered mode goes through the cluster: producers hand their stream to
//! the local broker, consumers ask the directory where the channel lives.
//! Direct mode connects to a caller-supplied endpoint. Both end in the same
//! handshake and the same handles.

use crate::channel::{ReceiveHandle, SendHandle};
use crate::config::{TransportConfig, queue_capacity};
use crate::directory::DirectoryClient;
use crate::error::TransportError;
use crate::net::{ChannelStream, dial, within};
use crate::wire::{ChannelHello, Frame, read_frame, write_frame};
use log::{debug, info, warn};
use netchan_core::{ChannelName, ChannelState, Direction, Endpoint, StateCell};
use netchan_ports::Directory;
use std::sync::Arc;

/// Open the send side of `name` through the local broker at `local_broker`.
///
/// The broker hosts the stream and publishes the channel in the directory,
/// so consumers can find it by name.
pub async fn open_send(
    name: &ChannelName,
    local_broker: &Endpoint,
    config: &TransportConfig,
) -> Result<SendHandle, TransportError> {
    info!("Opening send channel {} via broker {}", name, local_broker);
    let (stream, state) = connect(name, local_broker, Direction::Send, true, config).await?;
    Ok(SendHandle::spawn(
        name.clone(),
        stream,
        config.send_capacity(),
        config.send_buffer > 0,
        state,
    ))
}

/// Open the send side of `name` straight at `target`, bypassing discovery
pub async fn open_direct_send(
    name: &ChannelName,
    target: &Endpoint,
    config: &TransportConfig,
) -> Result<SendHandle, TransportError> {
    info!("Opening direct send channel {} to {}", name, target);
    let (stream, state) = connect(name, target, Direction::Send, false, config).await?;
    Ok(SendHandle::spawn(
        name.clone(),
        stream,
        config.send_capacity(),
        config.send_buffer > 0,
        state,
    ))
}

/// Resolve `name` through the leader at `leader`, then open its receive side.
///
/// The directory is asked exactly once per call; nothing is cached. A
/// leader that cannot be reached fails with `Connection` or `Tls`, a name it
/// does not know with `Resolution`.
pub async fn open_receive(
    name: &ChannelName,
    leader: &Endpoint,
    buffer_size: usize,
    config: &TransportConfig,
) -> Result<ReceiveHandle, TransportError> {
    let directory = DirectoryClient::new(leader.clone(), config.clone());
    let endpoint = directory.lookup(name).await?;
    debug!("Channel {} resolved to {} by {}", name, endpoint, leader);
    open_direct_receive(name, &endpoint, buffer_size, config).await
}

/// `open_receive` with any directory implementation
pub async fn open_receive_via(
    directory: &dyn Directory,
    name: &ChannelName,
    buffer_size: usize,
    config: &TransportConfig,
) -> Result<ReceiveHandle, TransportError> {
    let endpoint = directory.resolve(name).await?;
    debug!("Channel {} resolved to {}", name, endpoint);
    open_direct_receive(name, &endpoint, buffer_size, config).await
}

/// Open the receive side of `name` straight at `target`.
///
/// Up to `buffer_size` messages are read ahead of the caller; 0 keeps a
/// single message in flight.
pub async fn open_direct_receive(
    name: &ChannelName,
    target: &Endpoint,
    buffer_size: usize,
    config: &TransportConfig,
) -> Result<ReceiveHandle, TransportError> {
    info!("Opening receive channel {} from {}", name, target);
    let (stream, state) = connect(name, target, Direction::Receive, false, config).await?;
    Ok(ReceiveHandle::spawn(
        name.clone(),
        stream,
        queue_capacity(buffer_size),
        buffer_size > 0,
        state,
    ))
}

/// Dial `target` and run the Hello/Accept handshake
async fn connect(
    name: &ChannelName,
    target: &Endpoint,
    direction: Direction,
    announce: bool,
    config: &TransportConfig,
) -> Result<(ChannelStream, Arc<StateCell>), TransportError> {
    let state = Arc::new(StateCell::new());
    let _ = state.advance(ChannelState::Connecting);

    let result = async {
        let mut stream = dial(target, config).await?;
        within(config.connect_timeout(), "channel handshake", async {
            handshake(&mut stream, name, direction, announce).await
        })
        .await?;
        Ok(stream)
    }
    .await;

    match result {
        Ok(stream) => Ok((stream, state)),
        Err(e) => {
            state.close();
            warn!("Open of channel {} at {} failed: {}", name, target, e);
            Err(e)
        }
    }
}

async fn handshake(
    stream: &mut ChannelStream,
    name: &ChannelName,
    direction: Direction,
    announce: bool,
) -> Result<(), TransportError> {
    let hello = ChannelHello::new(name.clone(), direction, announce);
    write_frame(stream, &Frame::Hello(hello)).await?;

    match read_frame(stream).await? {
        Some(Frame::Accept) => Ok(()),
        Some(Frame::Reject(reason)) => Err(TransportError::Rejected {
            name: name.clone(),
            reason,
        }),
        Some(other) => Err(TransportError::Protocol(format!(
            "expected Accept or Reject, got {:?}",
            other.kind()
        ))),
        None => Err(TransportError::Connection(
            "remote closed the connection during the handshake".to_string(),
        )),
    }
}
