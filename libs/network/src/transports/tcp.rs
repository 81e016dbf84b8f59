//! TCP dialing
//!
//! Plain TCP connect with a bounded wait and Nagle disabled, shared by the
//! plain and TLS paths of the connector.

use crate::{ClientError, ClientResult};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{info, warn};

/// Connect to `address` (`host:port`) within `connect_timeout`
pub async fn dial(address: &str, connect_timeout: Duration) -> ClientResult<TcpStream> {
    info!("Connecting to VDSM at {}", address);

    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(address))
        .await
        .map_err(|_| ClientError::timeout("TCP connect", connect_timeout.as_millis() as u64))?
        .map_err(|e| ClientError::connect_with_source("Failed to connect", address, e))?;

    // Requests are small and latency-bound
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY: {}", e);
    }

    match stream.peer_addr() {
        Ok(peer) => info!("Connected to VDSM at {}", peer),
        Err(_) => info!("Connected to VDSM at {}", address),
    }
    Ok(stream)
}
