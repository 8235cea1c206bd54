//! Connection establishment (TCP, optionally wrapped in TLS)

use crate::config::TransportConfig;
use crate::error::TransportError;
use log::debug;
use netchan_core::Endpoint;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;

/// Byte stream a channel session runs on
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Plain or TLS connection, owned by exactly one relay
pub type ChannelStream = Box<dyn AsyncStream>;

/// Run `fut` under the configured connect timeout
pub(crate) async fn within<F, T>(
    limit: Duration,
    what: &str,
    fut: F,
) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| TransportError::Timeout(format!("{} after {:?}", what, limit)))?
}

/// Connect to `endpoint`, performing the TLS handshake when configured
pub async fn dial(
    endpoint: &Endpoint,
    config: &TransportConfig,
) -> Result<ChannelStream, TransportError> {
    let addr = endpoint.to_socket_string();

    let tcp = within(config.connect_timeout(), &format!("connect to {}", addr), async {
        TcpStream::connect(&addr)
            .await
            .map_err(|e| TransportError::Connection(format!("{}: {}", addr, e)))
    })
    .await?;
    tcp.set_nodelay(true)?;

    match &config.tls {
        None => {
            debug!("Connected to {}", addr);
            Ok(Box::new(tcp))
        }
        Some(tls) => {
            let connector = tls.connector()?;
            let server_name = tls.server_name_for(endpoint)?;
            let stream = within(
                config.connect_timeout(),
                &format!("TLS handshake with {}", addr),
                async {
                    connector
                        .connect(server_name, tcp)
                        .await
                        .map_err(|e| TransportError::Tls(format!("{}: {}", addr, e)))
                },
            )
            .await?;
            debug!("Connected to {} over TLS", addr);
            Ok(Box::new(stream))
        }
    }
}

/// Server side of `dial`: wrap an accepted socket in TLS when configured
pub async fn upgrade_accepted(
    tcp: TcpStream,
    acceptor: Option<&TlsAcceptor>,
    limit: Duration,
) -> Result<ChannelStream, TransportError> {
    tcp.set_nodelay(true)?;
    match acceptor {
        None => Ok(Box::new(tcp)),
        Some(acceptor) => {
            let stream = within(limit, "TLS accept", async {
                acceptor
                    .accept(tcp)
                    .await
                    .map_err(|e| TransportError::Tls(e.to_string()))
            })
            .await?;
            Ok(Box::new(stream))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_dial_refused_is_connection_error() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::from(listener.local_addr().unwrap());
        drop(listener);

        let result = dial(&endpoint, &TransportConfig::plain()).await;
        assert!(matches!(result, Err(TransportError::Connection(_))));
    }

    #[tokio::test]
    async fn test_within_times_out() {
        let result: Result<(), _> = within(Duration::from_millis(10), "sleep", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }
}
