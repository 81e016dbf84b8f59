//! Client Error Types
//!
//! One error type for every failure the RPC client can report: configuration
//! and credential loading, transport and handshake failures, session
//! operations, response decoding and remote RPC errors.

use std::path::{Path, PathBuf};
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Main client error type
#[derive(Error, Debug)]
pub enum ClientError {
    /// Configuration file could not be opened or decoded
    #[error("Configuration error: {message} ({})", .path.display())]
    ConfigLoad {
        path: PathBuf,
        message: String,
        source: Option<BoxedSource>,
    },

    /// CA bundle, client certificate or private key could not be loaded
    #[error("Certificate error: {message} ({})", .path.display())]
    CertLoad {
        path: PathBuf,
        message: String,
        source: Option<BoxedSource>,
    },

    /// Transport or STOMP handshake failure
    #[error("Connection error: {message} (remote: {remote})")]
    Connect {
        message: String,
        remote: String,
        source: Option<BoxedSource>,
    },

    /// Session rejected a subscription
    #[error("Subscribe error: {destination}: {message}")]
    Subscribe {
        destination: String,
        message: String,
        source: Option<BoxedSource>,
    },

    /// Session rejected an unsubscribe
    #[error("Unsubscribe error: {destination}: {message}")]
    Unsubscribe {
        destination: String,
        message: String,
        source: Option<BoxedSource>,
    },

    /// Publishing a frame failed
    #[error("Send error: {destination}: {message}")]
    Send {
        destination: String,
        message: String,
        source: Option<BoxedSource>,
    },

    /// Send was called for a reply destination nobody subscribed to
    #[error("No subscription for reply destination {destination}")]
    NotSubscribed { destination: String },

    /// Response body is not a valid JSON-RPC response
    #[error("Decode error: {message}")]
    Decode {
        message: String,
        source: Option<BoxedSource>,
    },

    /// Response id does not belong to the outstanding request
    #[error("Correlation id mismatch: expected {expected}, received {received}")]
    CorrelationMismatch { expected: String, received: String },

    /// Well-formed error response from the daemon
    #[error("Code {code}, message {message}")]
    Rpc { code: i64, message: String },

    /// Bounded wait elapsed
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Session ended while a reply was pending
    #[error("Connection closed: {message}")]
    ConnectionClosed { message: String },
}

/// Result type alias for client operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Create a configuration error
    pub fn config_load(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with source
    pub fn config_load_with_source(
        path: impl AsRef<Path>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ConfigLoad {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a certificate error
    pub fn cert_load(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::CertLoad {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a certificate error with source
    pub fn cert_load_with_source(
        path: impl AsRef<Path>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::CertLoad {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a connection error
    pub fn connect(message: impl Into<String>, remote: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
            remote: remote.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connect_with_source(
        message: impl Into<String>,
        remote: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connect {
            message: message.into(),
            remote: remote.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a subscribe error
    pub fn subscribe(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subscribe {
            destination: destination.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a subscribe error with source
    pub fn subscribe_with_source(
        destination: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Subscribe {
            destination: destination.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an unsubscribe error
    pub fn unsubscribe(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unsubscribe {
            destination: destination.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create an unsubscribe error with source
    pub fn unsubscribe_with_source(
        destination: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Unsubscribe {
            destination: destination.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a send error
    pub fn send(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Send {
            destination: destination.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a send error with source
    pub fn send_with_source(
        destination: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Send {
            destination: destination.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn not_subscribed(destination: impl Into<String>) -> Self {
        Self::NotSubscribed {
            destination: destination.into(),
        }
    }

    /// Create a decode error with source
    pub fn decode_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Decode {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn correlation_mismatch(expected: impl Into<String>, received: impl Into<String>) -> Self {
        Self::CorrelationMismatch {
            expected: expected.into(),
            received: received.into(),
        }
    }

    /// Create a remote RPC error
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn connection_closed(message: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            message: message.into(),
        }
    }

    /// Whether the client cannot continue at all.
    ///
    /// Only credential loading qualifies: without a valid CA bundle and
    /// client identity there is nothing a caller can reconnect with.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::CertLoad { .. })
    }

    /// Check if a calling layer may reasonably retry the operation
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Connect { .. } => true,
            ClientError::Send { .. } => true,
            ClientError::Timeout { .. } => true,
            ClientError::ConnectionClosed { .. } => true,
            ClientError::Subscribe { .. } => true,
            ClientError::Unsubscribe { .. } => false,
            ClientError::ConfigLoad { .. } => false,
            ClientError::CertLoad { .. } => false,
            ClientError::NotSubscribed { .. } => false,
            ClientError::Decode { .. } => false,
            ClientError::CorrelationMismatch { .. } => false,
            ClientError::Rpc { .. } => false,
        }
    }

    /// Get error category for log fields
    pub fn category(&self) -> &'static str {
        match self {
            ClientError::ConfigLoad { .. } => "config_load",
            ClientError::CertLoad { .. } => "cert_load",
            ClientError::Connect { .. } => "connect",
            ClientError::Subscribe { .. } => "subscribe",
            ClientError::Unsubscribe { .. } => "unsubscribe",
            ClientError::Send { .. } => "send",
            ClientError::NotSubscribed { .. } => "not_subscribed",
            ClientError::Decode { .. } => "decode",
            ClientError::CorrelationMismatch { .. } => "decode",
            ClientError::Rpc { .. } => "rpc",
            ClientError::Timeout { .. } => "timeout",
            ClientError::ConnectionClosed { .. } => "connection_closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let err = ClientError::connect("Connection refused", "localhost:54321");
        assert_eq!(err.category(), "connect");
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Connection error: Connection refused (remote: localhost:54321)"
        );
    }

    #[test]
    fn test_only_cert_load_is_fatal() {
        assert!(ClientError::cert_load("/etc/pki/vdsm/certs/cacert.pem", "no certificates").is_fatal());
        assert!(!ClientError::config_load("config.json", "missing").is_fatal());
        assert!(!ClientError::rpc(-32601, "Method not found").is_fatal());
        assert!(!ClientError::timeout("reply", 1000).is_fatal());
    }

    #[test]
    fn test_rpc_error_display() {
        let err = ClientError::rpc(100, "General Exception");
        assert_eq!(err.to_string(), "Code 100, message General Exception");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_correlation_mismatch_is_decode_kind() {
        let err = ClientError::correlation_mismatch("aaa", "bbb");
        assert_eq!(err.category(), "decode");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_source_is_preserved() {
        use std::error::Error as _;

        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = ClientError::connect_with_source("Failed to connect", "127.0.0.1:1", io_err);
        assert!(err.source().is_some());

        let err = ClientError::connect("Failed to connect", "127.0.0.1:1");
        assert!(err.source().is_none());
    }
}
