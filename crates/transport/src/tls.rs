//! TLS configuration for channel and directory connections
//!
//! When TLS is configured the TCP stream is wrapped before the first
//! handshake frame is written. A failed TLS handshake fails the open; there
//! is no plaintext fallback.

use crate::error::TransportError;
use netchan_core::Endpoint;
use rustls::server::AllowAnyAuthenticatedClient;
use rustls::{Certificate, ClientConfig, PrivateKey, RootCertStore, ServerConfig, ServerName};
use rustls_pemfile::Item;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// Certificate material (PEM files)
///
/// * client side: `ca` verifies the server; `cert` + `key` enable mutual TLS
/// * server side: `cert` + `key` identify the server; `ca` makes client
///   certificates mandatory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSettings {
    #[serde(default)]
    pub cert: Option<PathBuf>,
    #[serde(default)]
    pub key: Option<PathBuf>,
    #[serde(default)]
    pub ca: Option<PathBuf>,
    /// Name checked against the server certificate instead of the endpoint host
    #[serde(default)]
    pub server_name: Option<String>,
}

impl TlsSettings {
    /// Client settings trusting `ca`
    pub fn client(ca: impl Into<PathBuf>) -> Self {
        Self {
            ca: Some(ca.into()),
            ..Default::default()
        }
    }

    /// Server settings presenting `cert`/`key`
    pub fn server(cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self {
            cert: Some(cert.into()),
            key: Some(key.into()),
            ..Default::default()
        }
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    pub fn client_config(&self) -> Result<ClientConfig, TransportError> {
        let ca = self.ca.as_deref().ok_or_else(|| {
            TransportError::Config("TLS client needs a CA certificate to verify servers".into())
        })?;
        let roots = load_roots(ca)?;

        let builder = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots);

        match (&self.cert, &self.key) {
            (Some(cert), Some(key)) => builder
                .with_client_auth_cert(load_certs(cert)?, load_key(key)?)
                .map_err(|e| TransportError::Tls(format!("Failed to create client config: {}", e))),
            (None, None) => Ok(builder.with_no_client_auth()),
            _ => Err(TransportError::Config(
                "TLS client certificate and key must be given together".into(),
            )),
        }
    }

    pub fn server_config(&self) -> Result<ServerConfig, TransportError> {
        let (cert, key) = match (&self.cert, &self.key) {
            (Some(cert), Some(key)) => (load_certs(cert)?, load_key(key)?),
            _ => {
                return Err(TransportError::Config(
                    "TLS server needs both a certificate and a key".into(),
                ));
            }
        };

        let builder = ServerConfig::builder().with_safe_defaults();
        let builder = match &self.ca {
            Some(ca) => {
                let verifier = AllowAnyAuthenticatedClient::new(load_roots(ca)?);
                builder.with_client_cert_verifier(Arc::new(verifier))
            }
            None => builder.with_no_client_auth(),
        };

        builder
            .with_single_cert(cert, key)
            .map_err(|e| TransportError::Tls(format!("Failed to create server config: {}", e)))
    }

    pub fn connector(&self) -> Result<TlsConnector, TransportError> {
        Ok(TlsConnector::from(Arc::new(self.client_config()?)))
    }

    pub fn acceptor(&self) -> Result<TlsAcceptor, TransportError> {
        Ok(TlsAcceptor::from(Arc::new(self.server_config()?)))
    }

    /// Name the server certificate must match when dialing `endpoint`
    pub fn server_name_for(&self, endpoint: &Endpoint) -> Result<ServerName, TransportError> {
        let name = self.server_name.as_deref().unwrap_or(endpoint.host());
        ServerName::try_from(name)
            .map_err(|_| TransportError::Tls(format!("Invalid TLS server name: {}", name)))
    }
}

fn open(path: &Path) -> Result<BufReader<File>, TransportError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| TransportError::Config(format!("Cannot read {}: {}", path.display(), e)))
}

fn read_items(path: &Path) -> Result<Vec<Item>, TransportError> {
    rustls_pemfile::read_all(&mut open(path)?)
        .map_err(|e| TransportError::Config(format!("Invalid PEM in {}: {}", path.display(), e)))
}

fn load_certs(path: &Path) -> Result<Vec<Certificate>, TransportError> {
    let certs: Vec<Certificate> = read_items(path)?
        .into_iter()
        .filter_map(|item| match item {
            Item::X509Certificate(der) => Some(Certificate(der)),
            _ => None,
        })
        .collect();

    if certs.is_empty() {
        return Err(TransportError::Config(format!(
            "No certificate found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKey, TransportError> {
    read_items(path)?
        .into_iter()
        .find_map(|item| match item {
            Item::PKCS8Key(der) | Item::RSAKey(der) | Item::ECKey(der) => Some(PrivateKey(der)),
            _ => None,
        })
        .ok_or_else(|| {
            TransportError::Config(format!("No private key found in {}", path.display()))
        })
}

fn load_roots(path: &Path) -> Result<RootCertStore, TransportError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots
            .add(&cert)
            .map_err(|e| TransportError::Tls(format!("Failed to add CA cert: {}", e)))?;
    }
    Ok(roots)
}
