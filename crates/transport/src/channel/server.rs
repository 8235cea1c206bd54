//! Accepting channel sessions
//!
//! A listener performs the transport setup (TLS when configured) and reads
//! the peer's Hello; what to do with the session is up to the caller, which
//! either rejects it or turns it into a handle.

use crate::channel::{ReceiveHandle, SendHandle};
use crate::config::{TransportConfig, queue_capacity};
use crate::error::TransportError;
use crate::net::{ChannelStream, upgrade_accepted, within};
use crate::wire::{ChannelHello, Frame, PROTOCOL_VERSION, read_frame, write_frame};
use log::{debug, warn};
use netchan_core::{ChannelName, ChannelState, Direction, Endpoint, StateCell};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

/// Pause after a failed accept, e.g. while the process is out of descriptors
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// TCP (or TLS) listener producing channel sessions
pub struct ChannelListener {
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    timeout: Duration,
}

impl ChannelListener {
    /// Bind to `addr`; TLS server material is loaded up front so a bad
    /// certificate fails here rather than on the first connection.
    pub async fn bind(addr: &str, config: &TransportConfig) -> Result<Self, TransportError> {
        let acceptor = match &config.tls {
            Some(tls) => Some(tls.acceptor()?),
            None => None,
        };
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::Connection(format!("bind {}: {}", addr, e)))?;

        Ok(Self {
            listener,
            acceptor,
            timeout: config.connect_timeout(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Endpoint peers should dial; wildcard binds are reported as loopback
    pub fn local_endpoint(&self) -> Result<Endpoint, TransportError> {
        let mut addr = self.local_addr()?;
        if addr.ip().is_unspecified() {
            addr.set_ip(std::net::Ipv4Addr::LOCALHOST.into());
        }
        Ok(Endpoint::from(addr))
    }

    /// Wait for the next peer and read its Hello
    pub async fn accept(&self) -> Result<IncomingChannel, TransportError> {
        let (tcp, peer) = self.accept_raw().await?;
        self.upgrader().handshake(tcp, peer).await
    }

    /// Next TCP connection, before TLS and before any frame is read.
    ///
    /// Servers that must keep accepting while a slow peer handshakes pass
    /// the socket to an `Upgrader` on their own task.
    pub async fn accept_raw(&self) -> Result<(TcpStream, SocketAddr), TransportError> {
        let (tcp, peer) = self.listener.accept().await?;
        debug!("Accepted connection from {}", peer);
        Ok((tcp, peer))
    }

    /// Next TCP connection for a long-running server.
    ///
    /// A failed accept is logged and retried after a short pause instead of
    /// ending the server.
    pub async fn next_connection(&self) -> (TcpStream, SocketAddr) {
        retry_accept(|| self.accept_raw(), ACCEPT_BACKOFF).await
    }

    pub fn upgrader(&self) -> Upgrader {
        Upgrader {
            acceptor: self.acceptor.clone(),
            timeout: self.timeout,
        }
    }
}

async fn retry_accept<T, F, Fut>(mut accept: F, backoff: Duration) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    loop {
        match accept().await {
            Ok(conn) => return conn,
            Err(e) => {
                warn!("Accept failed, retrying in {:?}: {}", backoff, e);
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Server-side connection setup detached from the listener
#[derive(Clone)]
pub struct Upgrader {
    acceptor: Option<TlsAcceptor>,
    timeout: Duration,
}

impl Upgrader {
    /// Wrap an accepted socket in TLS when configured
    pub async fn upgrade(&self, tcp: TcpStream) -> Result<ChannelStream, TransportError> {
        upgrade_accepted(tcp, self.acceptor.as_ref(), self.timeout).await
    }

    /// Upgrade, then read the peer's channel Hello
    pub async fn handshake(
        &self,
        tcp: TcpStream,
        peer: SocketAddr,
    ) -> Result<IncomingChannel, TransportError> {
        let stream = self.upgrade(tcp).await?;
        IncomingChannel::handshake(stream, peer, self.timeout).await
    }
}

/// A peer that has said Hello and waits for Accept or Reject
pub struct IncomingChannel {
    hello: ChannelHello,
    stream: ChannelStream,
    peer: SocketAddr,
}

impl IncomingChannel {
    async fn handshake(
        mut stream: ChannelStream,
        peer: SocketAddr,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let hello = within(timeout, "waiting for Hello", async {
            match read_frame(&mut stream).await? {
                Some(Frame::Hello(hello)) => Ok(hello),
                Some(other) => Err(TransportError::Protocol(format!(
                    "expected Hello, got {:?}",
                    other.kind()
                ))),
                None => Err(TransportError::Connection(format!(
                    "{} disconnected before Hello",
                    peer
                ))),
            }
        })
        .await?;

        let incoming = Self { hello, stream, peer };
        if incoming.hello.version != PROTOCOL_VERSION {
            let reason = format!(
                "unsupported protocol version {} (expected {})",
                incoming.hello.version, PROTOCOL_VERSION
            );
            warn!("Rejecting {}: {}", peer, reason);
            incoming.reject(&reason).await?;
            return Err(TransportError::Protocol(reason));
        }
        Ok(incoming)
    }

    pub fn name(&self) -> &ChannelName {
        &self.hello.name
    }

    /// Direction the peer opened: `Send` means the peer produces
    pub fn direction(&self) -> Direction {
        self.hello.direction
    }

    /// Whether the peer asked for the channel to be published in the directory
    pub fn announce(&self) -> bool {
        self.hello.announce
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Refuse the session with a reason the peer reports as `Rejected`
    pub async fn reject(self, reason: &str) -> Result<(), TransportError> {
        let mut stream = self.stream;
        write_frame(&mut stream, &Frame::Reject(reason.to_string())).await?;
        let _ = stream.shutdown().await;
        Ok(())
    }

    /// Confirm the session and hand back the stream positioned after Accept
    pub async fn accept(self) -> Result<ChannelStream, TransportError> {
        let mut stream = self.stream;
        write_frame(&mut stream, &Frame::Accept).await?;
        Ok(stream)
    }

    /// Accept a producing peer and read its messages through a handle
    pub async fn into_receive_handle(
        self,
        buffer_size: usize,
    ) -> Result<ReceiveHandle, TransportError> {
        if self.direction() != Direction::Send {
            return Err(TransportError::Protocol(format!(
                "peer {} opened {} for receiving",
                self.peer,
                self.name()
            )));
        }
        let name = self.hello.name.clone();
        let stream = self.accept().await?;
        Ok(ReceiveHandle::spawn(
            name,
            stream,
            queue_capacity(buffer_size),
            buffer_size > 0,
            accepted_state(),
        ))
    }

    /// Accept a consuming peer and write messages to it through a handle
    pub async fn into_send_handle(self, buffer_size: usize) -> Result<SendHandle, TransportError> {
        if self.direction() != Direction::Receive {
            return Err(TransportError::Protocol(format!(
                "peer {} opened {} for sending",
                self.peer,
                self.name()
            )));
        }
        let name = self.hello.name.clone();
        let stream = self.accept().await?;
        Ok(SendHandle::spawn(
            name,
            stream,
            queue_capacity(buffer_size),
            buffer_size > 0,
            accepted_state(),
        ))
    }
}

fn accepted_state() -> Arc<StateCell> {
    let state = Arc::new(StateCell::new());
    let _ = state.advance(ChannelState::Connecting);
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{open_direct_receive, open_direct_send};

    async fn listener() -> (ChannelListener, Endpoint) {
        let listener = ChannelListener::bind("127.0.0.1:0", &TransportConfig::plain())
            .await
            .unwrap();
        let endpoint = listener.local_endpoint().unwrap();
        (listener, endpoint)
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_errors_are_retried() {
        let mut attempts = 0u32;
        let conn = retry_accept(
            || {
                attempts += 1;
                let attempt = attempts;
                async move {
                    if attempt < 3 {
                        Err(TransportError::Io("Too many open files".into()))
                    } else {
                        Ok(attempt)
                    }
                }
            },
            ACCEPT_BACKOFF,
        )
        .await;
        assert_eq!(conn, 3);
    }

    #[tokio::test]
    async fn test_accept_reads_hello() {
        let (listener, endpoint) = listener().await;
        let name = ChannelName::new("in").unwrap();

        let client = tokio::spawn({
            let name = name.clone();
            async move {
                let mut send = open_direct_send(&name, &endpoint, &TransportConfig::plain())
                    .await
                    .unwrap();
                send.send(b"x".to_vec()).await.unwrap();
                send.close().await.unwrap()
            }
        });

        let incoming = listener.accept().await.unwrap();
        assert_eq!(incoming.name(), &name);
        assert_eq!(incoming.direction(), Direction::Send);
        assert!(!incoming.announce());

        let mut recv = incoming.into_receive_handle(0).await.unwrap();
        assert_eq!(recv.collect().await.unwrap(), vec![b"x".to_vec()]);
        assert_eq!(client.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reject_reaches_client() {
        let (listener, endpoint) = listener().await;
        let name = ChannelName::new("nope").unwrap();

        let server = tokio::spawn(async move {
            let incoming = listener.accept().await.unwrap();
            incoming.reject("unknown channel").await.unwrap();
        });

        let result = open_direct_receive(&name, &endpoint, 0, &TransportConfig::plain()).await;
        match result {
            Err(TransportError::Rejected { name: n, reason }) => {
                assert_eq!(n, name);
                assert_eq!(reason, "unknown channel");
            }
            other => panic!("expected rejection, got {:?}", other.map(|_| ())),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_direction_mismatch_is_refused() {
        let (listener, endpoint) = listener().await;
        let name = ChannelName::new("dir").unwrap();

        let client = tokio::spawn(async move {
            open_direct_receive(&name, &endpoint, 0, &TransportConfig::plain()).await
        });

        let incoming = listener.accept().await.unwrap();
        assert!(matches!(
            incoming.into_receive_handle(0).await,
            Err(TransportError::Protocol(_))
        ));
        // Dropping the session without a reply ends the client's handshake
        assert!(client.await.unwrap().is_err());
    }
}
