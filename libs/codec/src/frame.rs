//! STOMP frame model
//!
//! A frame is a command line, an ordered list of headers and an opaque body.
//! Headers keep their wire order; when a header repeats, the first
//! occurrence is the one that counts.

use bytes::Bytes;
use std::fmt;

/// Frame commands used by the client and the broker
pub mod commands {
    pub const CONNECT: &str = "CONNECT";
    pub const STOMP: &str = "STOMP";
    pub const CONNECTED: &str = "CONNECTED";
    pub const SEND: &str = "SEND";
    pub const SUBSCRIBE: &str = "SUBSCRIBE";
    pub const UNSUBSCRIBE: &str = "UNSUBSCRIBE";
    pub const ACK: &str = "ACK";
    pub const NACK: &str = "NACK";
    pub const DISCONNECT: &str = "DISCONNECT";
    pub const MESSAGE: &str = "MESSAGE";
    pub const RECEIPT: &str = "RECEIPT";
    pub const ERROR: &str = "ERROR";
}

/// A single STOMP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Frame {
    /// Create a frame with no headers and an empty body
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Append a header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Replace the body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value for `key`, if any
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is(&self, command: &str) -> bool {
        self.command == command
    }

    /// Whether header names and values on this frame are escaped on the wire.
    ///
    /// CONNECT and CONNECTED frames are exempt so that 1.0 peers can still
    /// negotiate.
    pub fn uses_escaping(&self) -> bool {
        uses_escaping(&self.command)
    }

    /// Human-readable summary of an ERROR frame: its `message` header plus
    /// the body when it is valid UTF-8.
    pub fn error_summary(&self) -> String {
        let message = self.get_header("message").unwrap_or("broker error");
        match std::str::from_utf8(&self.body) {
            Ok(body) if !body.trim().is_empty() => format!("{}: {}", message, body.trim()),
            _ => message.to_string(),
        }
    }
}

pub(crate) fn uses_escaping(command: &str) -> bool {
    !matches!(command, commands::CONNECT | commands::CONNECTED)
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.command)?;
        for (key, value) in &self.headers {
            writeln!(f, "  {}: {}", key, value)?;
        }
        write!(f, "  body: {} bytes", self.body.len())
    }
}
