//! # STOMP Message Session
//!
//! ## Purpose
//!
//! Wraps a transport stream in a STOMP 1.2 session: CONNECT handshake with
//! heartbeat negotiation, SEND, SUBSCRIBE/UNSUBSCRIBE with automatic
//! acknowledgement, and a non-graceful teardown.
//!
//! ## Architecture
//!
//! ```text
//!                  ┌──────────── writer (tokio Mutex) ◄── send/subscribe/heartbeat task
//! BoxedStream ─ Framed<StompCodec>
//!                  └──────────── reader task ──► route table ──► Subscription receivers
//!                                                 (subscription id → channel)
//! ```
//!
//! The reader task owns the read half. MESSAGE frames are routed by their
//! `subscription` header; ERROR frames are copied to every consumer so a
//! pending call fails instead of hanging. When the stream ends, or the
//! broker misses heartbeats, every route is dropped and consumers observe a
//! closed channel.

use crate::transports::BoxedStream;
use crate::{ClientError, ClientResult, Configuration};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use stomp_codec::{
    commands, format_heartbeat_header, negotiate_heartbeats, parse_heartbeat_header, Frame, NegotiatedHeartbeat,
    StompCodec, StompError, StompItem, DEFAULT_MAX_FRAME_SIZE, STOMP_VERSION,
};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, trace, warn};

type FramedStream = Framed<BoxedStream, StompCodec>;
type FrameSink = SplitSink<FramedStream, StompItem>;
type FrameSource = SplitStream<FramedStream>;
type RouteTable = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Frame>>>>;

/// Upper bound on the best-effort DISCONNECT write
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// Handshake parameters
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Value of the `host` header
    pub host: String,
    pub outgoing_heartbeat: Duration,
    pub incoming_heartbeat: Duration,
    pub handshake_timeout: Duration,
    pub max_frame_size: usize,
}

impl SessionOptions {
    pub fn from_config(config: &Configuration) -> Self {
        Self {
            host: config.hostname.clone(),
            outgoing_heartbeat: config.outgoing_heartbeat_interval(),
            incoming_heartbeat: config.incoming_heartbeat_interval(),
            handshake_timeout: config.connect_timeout(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Consumer handle for one SUBSCRIBE
#[derive(Debug)]
pub struct Subscription {
    destination: String,
    id: String,
    receiver: mpsc::UnboundedReceiver<Frame>,
}

impl Subscription {
    pub(crate) fn new(
        destination: impl Into<String>,
        id: impl Into<String>,
        receiver: mpsc::UnboundedReceiver<Frame>,
    ) -> Self {
        Self {
            destination: destination.into(),
            id: id.into(),
            receiver,
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Value sent in the SUBSCRIBE `id` header
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next MESSAGE (or ERROR) frame; `None` once the session is gone
    pub async fn read(&mut self) -> Option<Frame> {
        self.receiver.recv().await
    }

    /// Drop frames that arrived before the caller started waiting
    pub fn discard_pending(&mut self) -> usize {
        let mut discarded = 0;
        while self.receiver.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}

/// Live STOMP session over one transport stream
pub struct StompSession {
    remote: String,
    version: String,
    heartbeat: NegotiatedHeartbeat,
    writer: Arc<AsyncMutex<FrameSink>>,
    routes: RouteTable,
    reader_task: JoinHandle<()>,
    heartbeat_task: Option<JoinHandle<()>>,
}

impl StompSession {
    /// Perform the CONNECT handshake and start the background tasks
    pub async fn connect(stream: BoxedStream, options: &SessionOptions) -> ClientResult<Self> {
        let remote = options.host.clone();
        let mut framed = Framed::new(stream, StompCodec::new(options.max_frame_size));

        let connect = Frame::new(commands::CONNECT)
            .header("accept-version", STOMP_VERSION)
            .header("host", &options.host)
            .header(
                "heart-beat",
                format_heartbeat_header(options.outgoing_heartbeat, options.incoming_heartbeat),
            );
        framed
            .send(StompItem::Frame(connect))
            .await
            .map_err(|e| ClientError::connect_with_source("Failed to send CONNECT frame", &remote, e))?;

        let connected = tokio::time::timeout(options.handshake_timeout, read_handshake_reply(&mut framed, &remote))
            .await
            .map_err(|_| ClientError::timeout("STOMP handshake", options.handshake_timeout.as_millis() as u64))??;

        let version = connected.get_header("version").unwrap_or("1.0").to_string();
        let client_heartbeat = (
            options.outgoing_heartbeat.as_millis() as u64,
            options.incoming_heartbeat.as_millis() as u64,
        );
        let server_heartbeat = connected
            .get_header("heart-beat")
            .and_then(parse_heartbeat_header)
            .unwrap_or((0, 0));
        let heartbeat = negotiate_heartbeats(client_heartbeat, server_heartbeat);

        info!(
            remote = %remote,
            version = %version,
            server = connected.get_header("server").unwrap_or("unknown"),
            outgoing_ms = heartbeat.outgoing.map(|d| d.as_millis() as u64).unwrap_or(0),
            incoming_ms = heartbeat.incoming.map(|d| d.as_millis() as u64).unwrap_or(0),
            "STOMP session established"
        );

        let (sink, source): (FrameSink, FrameSource) = framed.split();
        let writer = Arc::new(AsyncMutex::new(sink));
        let routes: RouteTable = Arc::default();

        let reader_task = tokio::spawn(read_loop(source, Arc::clone(&routes), heartbeat.incoming));
        let heartbeat_task = heartbeat
            .outgoing
            .map(|period| tokio::spawn(heartbeat_loop(Arc::clone(&writer), period)));

        Ok(Self {
            remote,
            version,
            heartbeat,
            writer,
            routes,
            reader_task,
            heartbeat_task,
        })
    }

    /// Publish `body` to `destination`
    pub async fn send(
        &self,
        destination: &str,
        headers: &[(&str, &str)],
        body: impl Into<Bytes>,
    ) -> ClientResult<()> {
        if !self.is_alive() {
            return Err(ClientError::send(destination, "session closed"));
        }

        let mut frame = Frame::new(commands::SEND).header("destination", destination);
        for (key, value) in headers {
            frame = frame.header(*key, *value);
        }
        let frame = frame.with_body(body);
        let bytes = frame.body.len();

        self.write(frame)
            .await
            .map_err(|e| ClientError::send_with_source(destination, "Failed to publish frame", e))?;

        debug!(destination = %destination, bytes, "Published frame");
        Ok(())
    }

    /// Subscribe with `ack:auto` under the given subscription id
    pub async fn subscribe(&self, destination: &str, id: String) -> ClientResult<Subscription> {
        if !self.is_alive() {
            return Err(ClientError::subscribe(destination, "session closed"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.lock().insert(id.clone(), tx);

        let frame = Frame::new(commands::SUBSCRIBE)
            .header("destination", destination)
            .header("id", &id)
            .header("ack", "auto");

        if let Err(e) = self.write(frame).await {
            self.routes.lock().remove(&id);
            return Err(ClientError::subscribe_with_source(destination, "Failed to send SUBSCRIBE frame", e));
        }

        debug!(destination = %destination, subscription = %id, "Subscribed");
        Ok(Subscription::new(destination, id, rx))
    }

    /// Cancel a subscription; its handle is consumed either way
    pub async fn unsubscribe(&self, subscription: Subscription) -> ClientResult<()> {
        self.routes.lock().remove(subscription.id());

        if !self.is_alive() {
            return Err(ClientError::unsubscribe(subscription.destination(), "session closed"));
        }

        let frame = Frame::new(commands::UNSUBSCRIBE).header("id", subscription.id());
        self.write(frame).await.map_err(|e| {
            ClientError::unsubscribe_with_source(subscription.destination(), "Failed to send UNSUBSCRIBE frame", e)
        })?;

        debug!(destination = %subscription.destination(), subscription = %subscription.id(), "Unsubscribed");
        Ok(())
    }

    /// Tear the session down without waiting for a receipt.
    ///
    /// In-flight frames may be lost. Errors are ignored.
    pub async fn disconnect(self) {
        if let Some(task) = &self.heartbeat_task {
            task.abort();
        }

        let writer = Arc::clone(&self.writer);
        let teardown = async move {
            let mut sink = writer.lock().await;
            let _ = sink.send(StompItem::Frame(Frame::new(commands::DISCONNECT))).await;
            let _ = sink.close().await;
        };
        if tokio::time::timeout(DISCONNECT_GRACE, teardown).await.is_err() {
            debug!(remote = %self.remote, "DISCONNECT write timed out");
        }

        info!(remote = %self.remote, "STOMP session closed");
    }

    /// Whether the reader task is still running
    pub fn is_alive(&self) -> bool {
        !self.reader_task.is_finished()
    }

    /// Protocol version from the CONNECTED frame
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn heartbeat(&self) -> NegotiatedHeartbeat {
        self.heartbeat
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    async fn write(&self, frame: Frame) -> Result<(), StompError> {
        let mut sink = self.writer.lock().await;
        sink.send(StompItem::Frame(frame)).await
    }
}

impl Drop for StompSession {
    fn drop(&mut self) {
        self.reader_task.abort();
        if let Some(task) = &self.heartbeat_task {
            task.abort();
        }
    }
}

async fn read_handshake_reply(framed: &mut FramedStream, remote: &str) -> ClientResult<Frame> {
    loop {
        match framed.next().await {
            Some(Ok(StompItem::Heartbeat)) => continue,
            Some(Ok(StompItem::Frame(frame))) if frame.is(commands::CONNECTED) => return Ok(frame),
            Some(Ok(StompItem::Frame(frame))) if frame.is(commands::ERROR) => {
                return Err(ClientError::connect(
                    format!("Broker rejected CONNECT: {}", frame.error_summary()),
                    remote,
                ))
            }
            Some(Ok(StompItem::Frame(frame))) => {
                return Err(ClientError::connect(
                    format!("Unexpected {} frame during handshake", frame.command),
                    remote,
                ))
            }
            Some(Err(e)) => return Err(ClientError::connect_with_source("Failed to read CONNECTED frame", remote, e)),
            None => return Err(ClientError::connect("Connection closed during handshake", remote)),
        }
    }
}

/// Drops every route when the reader task ends, including by panic or abort
struct CloseRoutesOnExit(RouteTable);

impl Drop for CloseRoutesOnExit {
    fn drop(&mut self) {
        self.0.lock().clear();
    }
}

async fn read_loop(mut source: FrameSource, routes: RouteTable, incoming: Option<Duration>) {
    let _close = CloseRoutesOnExit(Arc::clone(&routes));

    // Brokers get twice their advertised interval before the session is declared dead
    let deadline = incoming.map(|interval| interval * 2);

    loop {
        let next = match deadline {
            Some(limit) => match tokio::time::timeout(limit, source.next()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(timeout_ms = limit.as_millis() as u64, "No data from broker, closing session");
                    break;
                }
            },
            None => source.next().await,
        };

        match next {
            Some(Ok(StompItem::Heartbeat)) => trace!("Heartbeat from broker"),
            Some(Ok(StompItem::Frame(frame))) => dispatch(&routes, frame),
            Some(Err(e)) => {
                warn!(error = %e, category = e.category(), "Failed to read STOMP frame, closing session");
                break;
            }
            None => {
                debug!("Broker closed the connection");
                break;
            }
        }
    }
}

fn dispatch(routes: &RouteTable, frame: Frame) {
    match frame.command.as_str() {
        commands::MESSAGE => {
            let Some(id) = frame.get_header("subscription").map(str::to_string) else {
                warn!("MESSAGE frame without subscription header");
                return;
            };

            let mut routes = routes.lock();
            match routes.get(&id).map(|tx| tx.send(frame).is_ok()) {
                Some(true) => trace!(subscription = %id, "Routed message"),
                Some(false) => {
                    debug!(subscription = %id, "Consumer dropped, discarding message");
                    routes.remove(&id);
                }
                None => debug!(subscription = %id, "MESSAGE for unknown subscription"),
            }
        }
        commands::ERROR => {
            warn!(error = %frame.error_summary(), "Broker sent ERROR frame");
            for tx in routes.lock().values() {
                let _ = tx.send(frame.clone());
            }
        }
        commands::RECEIPT => {
            debug!(receipt = frame.get_header("receipt-id").unwrap_or(""), "Receipt from broker");
        }
        other => debug!(command = other, "Ignoring unexpected frame"),
    }
}

async fn heartbeat_loop(writer: Arc<AsyncMutex<FrameSink>>, period: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        ticker.tick().await;
        let mut sink = writer.lock().await;
        if let Err(e) = sink.send(StompItem::Heartbeat).await {
            warn!(error = %e, "Failed to send heartbeat");
            break;
        }
        trace!("Heartbeat sent");
    }
}
