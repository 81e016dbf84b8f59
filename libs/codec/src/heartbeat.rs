//! Heartbeat negotiation
//!
//! The `heart-beat` header is `cx,cy` in milliseconds: `cx` is how often the
//! sender can emit heartbeats, `cy` how often it wants to receive them. Zero
//! means "cannot" or "does not want". The effective rate in each direction is
//! the slower of what one side offers and the other side asks for.

use std::time::Duration;

/// Effective heartbeat intervals for one side of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NegotiatedHeartbeat {
    /// How often this side must write an EOL; `None` disables it
    pub outgoing: Option<Duration>,
    /// How often the peer has promised to write; `None` disables checking
    pub incoming: Option<Duration>,
}

/// Parse a `heart-beat` header value into `(cx, cy)` milliseconds
pub fn parse_heartbeat_header(value: &str) -> Option<(u64, u64)> {
    let (outgoing, incoming) = value.split_once(',')?;
    Some((outgoing.trim().parse().ok()?, incoming.trim().parse().ok()?))
}

/// Render the client side of the header from configured intervals
pub fn format_heartbeat_header(outgoing: Duration, incoming: Duration) -> String {
    format!("{},{}", outgoing.as_millis(), incoming.as_millis())
}

/// Combine the client's offer with the server's `CONNECTED` header
pub fn negotiate_heartbeats(client: (u64, u64), server: (u64, u64)) -> NegotiatedHeartbeat {
    let (client_out, client_in) = client;
    let (server_out, server_in) = server;

    let outgoing = if client_out == 0 || server_in == 0 {
        None
    } else {
        Some(Duration::from_millis(client_out.max(server_in)))
    };
    let incoming = if client_in == 0 || server_out == 0 {
        None
    } else {
        Some(Duration::from_millis(client_in.max(server_out)))
    };

    NegotiatedHeartbeat { outgoing, incoming }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_heartbeat_header() {
        assert_eq!(parse_heartbeat_header("10000,5000"), Some((10000, 5000)));
        assert_eq!(parse_heartbeat_header(" 0 , 0 "), Some((0, 0)));
        assert_eq!(parse_heartbeat_header("10000"), None);
        assert_eq!(parse_heartbeat_header("a,b"), None);
    }

    #[test]
    fn test_format_heartbeat_header() {
        let header = format_heartbeat_header(Duration::from_secs(10), Duration::ZERO);
        assert_eq!(header, "10000,0");
    }

    #[test]
    fn test_negotiation_takes_slower_rate() {
        let negotiated = negotiate_heartbeats((10_000, 10_000), (5_000, 20_000));
        assert_eq!(negotiated.outgoing, Some(Duration::from_millis(20_000)));
        assert_eq!(negotiated.incoming, Some(Duration::from_millis(10_000)));
    }

    #[test]
    fn test_zero_disables_direction() {
        let negotiated = negotiate_heartbeats((0, 10_000), (5_000, 5_000));
        assert_eq!(negotiated.outgoing, None);
        assert_eq!(negotiated.incoming, Some(Duration::from_millis(10_000)));

        let negotiated = negotiate_heartbeats((10_000, 10_000), (0, 0));
        assert_eq!(negotiated, NegotiatedHeartbeat::default());
    }
}
