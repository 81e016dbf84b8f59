//! # VDSM Client
//!
//! Request/response facade over one STOMP session.
//!
//! ```text
//! Client::connect ─► TransportConnector ─► StompSession
//! Client::subscribe(dest)            SUBSCRIBE dest (fresh id)
//! Client::send(dest, method, params) SEND request_destination, reply-to: dest
//!                                    ◄── MESSAGE on dest ─► result map
//! ```
//!
//! Callers own the reply destination: a destination must be subscribed
//! before requests naming it can be sent. One request per destination is
//! expected to be outstanding at a time.

use crate::ids::{IdGenerator, RandomIdGenerator};
use crate::protocol::{decode_response, encode_request};
use crate::registry::SubscriptionRegistry;
use crate::session::{SessionOptions, StompSession};
use crate::transports::TransportConnector;
use crate::{ClientError, ClientResult, Configuration};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use stomp_codec::commands;
use tracing::{debug, info, warn};

/// Connection lifecycle of a [`Client`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connected,
}

pub struct Client {
    session: Option<StompSession>,
    configuration: Option<Configuration>,
    subscriptions: SubscriptionRegistry,
    ids: Arc<dyn IdGenerator>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        Self::with_id_generator(Arc::new(RandomIdGenerator))
    }

    /// Client drawing subscription and request ids from `ids`
    pub fn with_id_generator(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            session: None,
            configuration: None,
            subscriptions: SubscriptionRegistry::new(),
            ids,
        }
    }

    /// Open a session to the daemon described by `configuration`.
    ///
    /// Any previous session is torn down first. Certificates are loaded
    /// before the socket is opened.
    pub async fn connect(&mut self, configuration: &Configuration) -> ClientResult<()> {
        if let Some(previous) = self.session.take() {
            debug!(remote = %previous.remote(), "Replacing existing session");
            previous.disconnect().await;
        }
        self.subscriptions.clear();
        self.configuration = None;

        let connector = TransportConnector::from_config(configuration)?;
        let stream = connector.connect().await?;
        let session = StompSession::connect(stream, &SessionOptions::from_config(configuration)).await?;

        info!(
            address = %connector.address(),
            tls = connector.is_tls(),
            version = %session.version(),
            "Connected to VDSM"
        );

        self.session = Some(session);
        self.configuration = Some(configuration.clone());
        Ok(())
    }

    /// Subscribe to a reply destination
    pub async fn subscribe(&mut self, destination: &str) -> ClientResult<()> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| ClientError::subscribe(destination, "not connected"))?;

        let subscription = session.subscribe(destination, self.ids.next_id()).await?;
        debug!(destination = %destination, subscription = %subscription.id(), "Registered reply destination");
        self.subscriptions.add(subscription);
        Ok(())
    }

    /// Call `method` and wait for its reply on `destination`.
    ///
    /// `destination` must already be subscribed; nothing is published
    /// otherwise.
    pub async fn send<P>(&mut self, destination: &str, method: &str, params: &P) -> ClientResult<Map<String, Value>>
    where
        P: Serialize + ?Sized,
    {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| ClientError::send(destination, "not connected"))?;
        let subscription = self
            .subscriptions
            .find_mut(destination)
            .ok_or_else(|| ClientError::not_subscribed(destination))?;
        let (request_destination, reply_timeout) = match &self.configuration {
            Some(config) => (config.request_destination.as_str(), config.reply_timeout()),
            None => return Err(ClientError::send(destination, "not connected")),
        };

        let request = encode_request(method, params, self.ids.as_ref())?;

        let stale = subscription.discard_pending();
        if stale > 0 {
            debug!(destination = %destination, stale, "Discarded stale replies");
        }

        session
            .send(request_destination, &[("reply-to", destination)], request.body)
            .await?;
        debug!(method = %method, id = %request.id, reply_to = %destination, "Request published");

        let reply = match reply_timeout {
            Some(limit) => tokio::time::timeout(limit, subscription.read())
                .await
                .map_err(|_| ClientError::timeout(format!("Reply to {}", method), limit.as_millis() as u64))?,
            None => subscription.read().await,
        };
        let frame = reply.ok_or_else(|| {
            ClientError::connection_closed(format!("Session ended while waiting for reply to {}", method))
        })?;

        if frame.is(commands::ERROR) {
            return Err(ClientError::send(
                destination,
                format!("Broker error: {}", frame.error_summary()),
            ));
        }

        let result = decode_response(&frame.body, Some(&request.id));
        match &result {
            Ok(map) => debug!(method = %method, id = %request.id, keys = map.len(), "Reply received"),
            Err(e) => warn!(method = %method, id = %request.id, error = %e, category = e.category(), "Request failed"),
        }
        result
    }

    /// Drop every subscription for `destination`.
    ///
    /// All matching subscriptions are removed even if cancelling one of them
    /// fails; the first failure is returned.
    pub async fn unsubscribe(&mut self, destination: &str) -> ClientResult<()> {
        let removed = self.subscriptions.remove_all(destination);
        let Some(session) = &self.session else {
            debug!(destination = %destination, dropped = removed.len(), "Dropped subscriptions while disconnected");
            return Ok(());
        };

        let mut first_error = None;
        for subscription in removed {
            if let Err(e) = session.unsubscribe(subscription).await {
                warn!(destination = %destination, error = %e, "Failed to unsubscribe");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Close the session without waiting for the broker. Safe to call twice.
    pub async fn disconnect(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.subscriptions.clear();
        self.configuration = None;
        session.disconnect().await;
    }

    pub fn state(&self) -> ClientState {
        match self.session {
            Some(_) => ClientState::Connected,
            None => ClientState::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ClientState::Connected
    }

    /// Configuration of the current session
    pub fn configuration(&self) -> Option<&Configuration> {
        self.configuration.as_ref()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// STOMP version announced by the broker
    pub fn negotiated_version(&self) -> Option<&str> {
        self.session.as_ref().map(StompSession::version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIdGenerator;

    #[tokio::test]
    async fn test_new_client_is_disconnected() {
        let client = Client::new();
        assert_eq!(client.state(), ClientState::Disconnected);
        assert!(!client.is_connected());
        assert!(client.configuration().is_none());
        assert!(client.negotiated_version().is_none());
        assert_eq!(client.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let mut client = Client::with_id_generator(Arc::new(SequentialIdGenerator::new("t-")));

        let err = client.subscribe("reply").await.unwrap_err();
        assert!(matches!(err, ClientError::Subscribe { .. }));

        let err = client.send("reply", "Host.ping", &Vec::<String>::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::Send { .. }));

        assert!(client.unsubscribe("reply").await.is_ok());
    }

    #[tokio::test]
    async fn test_disconnect_when_disconnected_is_noop() {
        let mut client = Client::new();
        client.disconnect().await;
        client.disconnect().await;
        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[tokio::test]
    async fn test_malformed_certificate_fails_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let ca = dir.path().join("ca.pem");
        std::fs::write(&ca, "not a certificate").unwrap();

        let config = Configuration {
            tls_enabled: true,
            ca_cert: ca,
            vdsm_cert: dir.path().join("cert.pem"),
            vdsm_key: dir.path().join("key.pem"),
            hostname: "127.0.0.1".to_string(),
            // Nothing listens here; a Connect error would mean I/O was attempted
            port: 1,
            ..Configuration::default()
        };

        let mut client = Client::new();
        let err = client.connect(&config).await.unwrap_err();
        assert!(err.is_fatal(), "Expected CertLoad, got {:?}", err);
        assert!(!client.is_connected());
    }
}
