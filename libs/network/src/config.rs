//! Client Configuration
//!
//! Connection settings for one VDSM session, read from a JSON file whose keys
//! use the daemon's PascalCase names:
//!
//! ```json
//! {
//!     "TlsEnabled": true,
//!     "CaCert": "/etc/pki/vdsm/certs/cacert.pem",
//!     "VdsmCert": "/etc/pki/vdsm/certs/vdsmcert.pem",
//!     "VdsmKey": "/etc/pki/vdsm/keys/vdsmkey.pem",
//!     "Hostname": "localhost",
//!     "Port": "54321",
//!     "IncomingHeartbeat": 10,
//!     "OutgoingHeartbeat": 10
//! }
//! ```

use crate::{ClientError, ClientResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Destination every request is published to
pub const DEFAULT_REQUEST_DESTINATION: &str = "jms.topic.vdsm_requests";

/// Port the daemon listens on by default
pub const DEFAULT_PORT: u16 = 54321;

pub const DEFAULT_REPLY_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Connection settings for the RPC client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Configuration {
    /// Wrap the connection in mutual TLS
    pub tls_enabled: bool,
    /// PEM bundle of authorities trusted to sign the daemon's certificate
    pub ca_cert: PathBuf,
    /// PEM client certificate presented to the daemon
    pub vdsm_cert: PathBuf,
    /// PEM private key for `vdsm_cert`
    pub vdsm_key: PathBuf,
    pub hostname: String,
    #[serde(deserialize_with = "port_from_string_or_number")]
    pub port: u16,
    /// Seconds between heartbeats expected from the broker, 0 disables
    pub incoming_heartbeat: u64,
    /// Seconds between heartbeats sent to the broker, 0 disables
    pub outgoing_heartbeat: u64,
    /// Destination requests are published to
    pub request_destination: String,
    /// Seconds to wait for a reply, 0 waits forever
    pub reply_timeout: u64,
    /// Seconds allowed for TCP connect and the STOMP handshake each
    pub connect_timeout: u64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            tls_enabled: false,
            ca_cert: PathBuf::new(),
            vdsm_cert: PathBuf::new(),
            vdsm_key: PathBuf::new(),
            hostname: "localhost".to_string(),
            port: DEFAULT_PORT,
            incoming_heartbeat: 0,
            outgoing_heartbeat: 0,
            request_destination: DEFAULT_REQUEST_DESTINATION.to_string(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT_SECS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl Configuration {
    /// Load a configuration file on top of the defaults
    pub fn from_file(path: impl AsRef<Path>) -> ClientResult<Self> {
        let mut configuration = Self::default();
        load_config(path, &mut configuration)?;
        Ok(configuration)
    }

    /// `hostname:port` as dialed by the transport
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    pub fn incoming_heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.incoming_heartbeat)
    }

    pub fn outgoing_heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.outgoing_heartbeat)
    }

    /// Bounded wait for replies; `None` when disabled
    pub fn reply_timeout(&self) -> Option<Duration> {
        (self.reply_timeout > 0).then(|| Duration::from_secs(self.reply_timeout))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout.max(1))
    }
}

/// Overlay the JSON file at `path` onto `configuration`.
///
/// An empty path is a no-op. Keys missing from the file keep whatever value
/// `configuration` already holds.
pub fn load_config(path: impl AsRef<Path>, configuration: &mut Configuration) -> ClientResult<()> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        debug!("No configuration file given, keeping current settings");
        return Ok(());
    }

    let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let contents = std::fs::read_to_string(&path)
        .map_err(|e| ClientError::config_load_with_source(&path, "Failed to open configuration file", e))?;

    let overrides: serde_json::Value = serde_json::from_str(&contents)
        .map_err(|e| ClientError::config_load_with_source(&path, "Failed to parse configuration JSON", e))?;
    let serde_json::Value::Object(overrides) = overrides else {
        return Err(ClientError::config_load(&path, "Configuration must be a JSON object"));
    };

    let mut merged = serde_json::to_value(&*configuration)
        .map_err(|e| ClientError::config_load_with_source(&path, "Failed to serialize current configuration", e))?;
    if let serde_json::Value::Object(current) = &mut merged {
        current.extend(overrides);
    }

    *configuration = serde_json::from_value(merged)
        .map_err(|e| ClientError::config_load_with_source(&path, "Invalid configuration value", e))?;

    info!(
        path = %path.display(),
        address = %configuration.address(),
        tls = configuration.tls_enabled,
        "Loaded client configuration"
    );
    Ok(())
}

/// The daemon's own configuration writes the port as a string
fn port_from_string_or_number<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_populates_every_field() {
        let file = write_config(
            r#"{
                "TlsEnabled": true,
                "CaCert": "/etc/pki/vdsm/certs/cacert.pem",
                "VdsmCert": "/etc/pki/vdsm/certs/vdsmcert.pem",
                "VdsmKey": "/etc/pki/vdsm/keys/vdsmkey.pem",
                "Hostname": "hypervisor-01",
                "Port": "54321",
                "IncomingHeartbeat": 10,
                "OutgoingHeartbeat": 5,
                "RequestDestination": "jms.topic.custom_requests",
                "ReplyTimeout": 15,
                "ConnectTimeout": 3
            }"#,
        );

        let config = Configuration::from_file(file.path()).unwrap();
        assert!(config.tls_enabled);
        assert_eq!(config.ca_cert, PathBuf::from("/etc/pki/vdsm/certs/cacert.pem"));
        assert_eq!(config.vdsm_cert, PathBuf::from("/etc/pki/vdsm/certs/vdsmcert.pem"));
        assert_eq!(config.vdsm_key, PathBuf::from("/etc/pki/vdsm/keys/vdsmkey.pem"));
        assert_eq!(config.hostname, "hypervisor-01");
        assert_eq!(config.port, 54321);
        assert_eq!(config.incoming_heartbeat, 10);
        assert_eq!(config.outgoing_heartbeat, 5);
        assert_eq!(config.request_destination, "jms.topic.custom_requests");
        assert_eq!(config.reply_timeout(), Some(Duration::from_secs(15)));
        assert_eq!(config.connect_timeout(), Duration::from_secs(3));
        assert_eq!(config.address(), "hypervisor-01:54321");
    }

    #[test]
    fn test_numeric_port_is_accepted() {
        let file = write_config(r#"{"Port": 4444}"#);
        let config = Configuration::from_file(file.path()).unwrap();
        assert_eq!(config.port, 4444);
    }

    #[test]
    fn test_empty_path_is_noop() {
        let mut config = Configuration {
            hostname: "kept".to_string(),
            ..Default::default()
        };
        let before = config.clone();

        load_config("", &mut config).unwrap();
        assert_eq!(config, before);
    }

    #[test]
    fn test_absent_keys_keep_existing_values() {
        let file = write_config(r#"{"IncomingHeartbeat": 10}"#);
        let mut config = Configuration {
            hostname: "engine.example.com".to_string(),
            outgoing_heartbeat: 7,
            ..Default::default()
        };

        load_config(file.path(), &mut config).unwrap();
        assert_eq!(config.incoming_heartbeat, 10);
        assert_eq!(config.outgoing_heartbeat, 7);
        assert_eq!(config.hostname, "engine.example.com");
        assert_eq!(config.request_destination, DEFAULT_REQUEST_DESTINATION);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Configuration::from_file("/nonexistent/vdsm.json").unwrap_err();
        assert_eq!(err.category(), "config_load");
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let file = write_config("{ not json");
        let err = Configuration::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ClientError::ConfigLoad { .. }));

        let file = write_config(r#"{"Port": "not-a-port"}"#);
        let err = Configuration::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ClientError::ConfigLoad { .. }));
    }

    #[test]
    fn test_zero_reply_timeout_waits_forever() {
        let config = Configuration {
            reply_timeout: 0,
            ..Default::default()
        };
        assert_eq!(config.reply_timeout(), None);
    }
}
