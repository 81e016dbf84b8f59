//! Mutual TLS context
//!
//! Builds a rustls client configuration from three PEM files: the CA bundle
//! the daemon's certificate must chain to, and the client certificate and key
//! presented back to it. Server verification is always on.

use crate::{ClientError, ClientResult, Configuration};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio_rustls::rustls::{self, ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

/// Client-side TLS context derived from the configured certificate paths
#[derive(Clone)]
pub struct TlsContext {
    config: Arc<ClientConfig>,
}

impl std::fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsContext").finish_non_exhaustive()
    }
}

impl TlsContext {
    /// Load certificates named by the configuration
    pub fn from_config(config: &Configuration) -> ClientResult<Self> {
        Self::from_pem_files(&config.ca_cert, &config.vdsm_cert, &config.vdsm_key)
    }

    /// Load the CA bundle and client identity from PEM files
    pub fn from_pem_files(ca_cert: &Path, client_cert: &Path, client_key: &Path) -> ClientResult<Self> {
        let roots = load_ca_bundle(ca_cert)?;
        let chain = load_cert_chain(client_cert)?;
        let key = load_private_key(client_key)?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| ClientError::cert_load_with_source(client_cert, "Unsupported TLS protocol configuration", e))?
            .with_root_certificates(roots)
            .with_client_auth_cert(chain, key)
            .map_err(|e| ClientError::cert_load_with_source(client_key, "Client certificate and key do not match", e))?;

        info!(ca = %ca_cert.display(), cert = %client_cert.display(), "Loaded TLS credentials");
        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Run the TLS handshake over an established TCP stream
    pub async fn handshake(&self, hostname: &str, stream: TcpStream) -> ClientResult<TlsStream<TcpStream>> {
        let server_name = ServerName::try_from(hostname.to_string())
            .map_err(|e| ClientError::connect_with_source("Invalid TLS server name", hostname, e))?;

        let connector = TlsConnector::from(Arc::clone(&self.config));
        let stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| ClientError::connect_with_source("TLS handshake failed", hostname, e))?;

        debug!(host = %hostname, "TLS handshake complete");
        Ok(stream)
    }
}

fn open_pem(path: &Path) -> ClientResult<BufReader<File>> {
    let file = File::open(path)
        .map_err(|e| ClientError::cert_load_with_source(path, "Failed to open PEM file", e))?;
    Ok(BufReader::new(file))
}

fn read_certificates(path: &Path) -> ClientResult<Vec<CertificateDer<'static>>> {
    let mut reader = open_pem(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ClientError::cert_load_with_source(path, "Failed to parse PEM certificates", e))?;
    if certs.is_empty() {
        return Err(ClientError::cert_load(path, "No certificates found"));
    }
    Ok(certs)
}

fn load_ca_bundle(path: &Path) -> ClientResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in read_certificates(path)? {
        roots
            .add(cert)
            .map_err(|e| ClientError::cert_load_with_source(path, "Invalid CA certificate", e))?;
    }
    debug!(path = %path.display(), count = roots.len(), "Loaded CA bundle");
    Ok(roots)
}

fn load_cert_chain(path: &Path) -> ClientResult<Vec<CertificateDer<'static>>> {
    read_certificates(path)
}

fn load_private_key(path: &Path) -> ClientResult<PrivateKeyDer<'static>> {
    let mut reader = open_pem(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ClientError::cert_load_with_source(path, "Failed to parse PEM private key", e))?
        .ok_or_else(|| ClientError::cert_load(path, "No private key found"))
}
