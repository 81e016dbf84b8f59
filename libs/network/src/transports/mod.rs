//! Transport Connector
//!
//! Produces the bidirectional byte stream a STOMP session runs over: either a
//! plain TCP socket or the same socket wrapped in mutual TLS. Credentials are
//! loaded when the connector is built, so a bad certificate path fails before
//! any network I/O happens.

use crate::{ClientResult, Configuration};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

pub mod tcp;
pub mod tls;


pub use tls::TlsContext;

/// Byte stream a session can run over
pub trait MessageStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> MessageStream for T {}

/// Type-erased stream handed to the session layer
pub type BoxedStream = Box<dyn MessageStream>;

/// Opens plain or TLS streams to the configured daemon
#[derive(Debug, Clone)]
pub struct TransportConnector {
    hostname: String,
    address: String,
    connect_timeout: Duration,
    tls: Option<TlsContext>,
}

impl TransportConnector {
    /// Build a connector, loading TLS credentials when enabled
    pub fn from_config(config: &Configuration) -> ClientResult<Self> {
        let tls = if config.tls_enabled {
            Some(TlsContext::from_config(config)?)
        } else {
            None
        };

        Ok(Self {
            hostname: config.hostname.clone(),
            address: config.address(),
            connect_timeout: config.connect_timeout(),
            tls,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Open the stream, running the TLS handshake when enabled
    pub async fn connect(&self) -> ClientResult<BoxedStream> {
        let stream = tcp::dial(&self.address, self.connect_timeout).await?;

        match &self.tls {
            Some(tls) => {
                let stream = tls.handshake(&self.hostname, stream).await?;
                debug!(address = %self.address, "Transport ready (tls)");
                Ok(Box::new(stream))
            }
            None => {
                debug!(address = %self.address, "Transport ready (plain)");
                Ok(Box::new(stream))
            }
        }
    }
}
