//! # STOMP Frame Codec
//!
//! ## Purpose
//!
//! This crate contains the wire layer used by the VDSM client to speak STOMP 1.2
//! to the broker embedded in the daemon:
//! - Frame model and builder (`Frame`)
//! - STOMP 1.2 header escaping
//! - `tokio_util` decoder/encoder with heartbeat EOL handling (`StompCodec`)
//! - Heartbeat header parsing and negotiation
//!
//! ## Architecture Role
//!
//! ```text
//! libs/codec → network/
//!     ↑           ↓
//! Frames +    Session, subscriptions,
//! framing     JSON-RPC correlation
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Socket management or connection handling (belongs in network/)
//! - Subscription routing or acknowledgement state
//! - Anything JSON-RPC specific

pub mod error;
pub mod frame;
pub mod heartbeat;
pub mod stomp;

pub use error::{StompError, StompResult};
pub use frame::{commands, Frame};
pub use heartbeat::{format_heartbeat_header, negotiate_heartbeats, parse_heartbeat_header, NegotiatedHeartbeat};
pub use stomp::{StompCodec, StompItem, DEFAULT_MAX_FRAME_SIZE};

/// Protocol version requested during the connect handshake
pub const STOMP_VERSION: &str = "1.2";
