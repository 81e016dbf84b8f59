//! VDSM Network Client
//!
//! JSON-RPC 2.0 client for the VDSM hypervisor daemon. Requests travel as
//! STOMP 1.2 frames over TCP, optionally wrapped in mutual TLS.
//!
//! Layers, bottom up:
//! - `transports`: TCP dial and the TLS handshake
//! - `session`: STOMP handshake, heartbeats and frame routing
//! - `protocol`: JSON-RPC request and response envelopes
//! - `client`: connect / subscribe / send / unsubscribe / disconnect

pub mod client;
pub mod config;
pub mod error;
pub mod ids;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transports;

pub use client::{Client, ClientState};
pub use config::{load_config, Configuration};
pub use error::{ClientError, ClientResult};
pub use ids::{generate_id, IdGenerator, RandomIdGenerator, SequentialIdGenerator};
pub use protocol::{decode_response, encode_request, EncodedRequest};
pub use session::{SessionOptions, StompSession, Subscription};
pub use transports::{TlsContext, TransportConnector};

pub use stomp_codec as stomp;
