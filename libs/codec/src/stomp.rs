//! # STOMP 1.2 Framing
//!
//! ## Purpose
//!
//! `tokio_util` codec turning a byte stream into [`StompItem`]s and back.
//! Bodies are delimited by `content-length` when the header is present and
//! by the first NUL byte otherwise. A bare EOL between frames is a heartbeat.
//!
//! ## Wire Format
//!
//! ```text
//! COMMAND EOL
//! *(header EOL)
//! EOL
//! *OCTET NUL
//! *(EOL)
//! ```
//!
//! EOL is `\n` or `\r\n`. Header names and values are escaped (`\\`, `\n`,
//! `\r`, `\c`) on every frame except CONNECT and CONNECTED.

use crate::error::StompError;
use crate::frame::{uses_escaping, Frame};
use bytes::{Buf, BufMut, BytesMut};
use std::borrow::Cow;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

/// Default upper bound for a single frame
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16MB

/// One unit read from or written to the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StompItem {
    Frame(Frame),
    Heartbeat,
}

/// STOMP frame codec
#[derive(Debug, Clone)]
pub struct StompCodec {
    max_frame_size: usize,
}

impl Default for StompCodec {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl StompCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn check_size(&self, size: usize) -> Result<(), StompError> {
        if size > self.max_frame_size {
            return Err(StompError::frame_too_large(size, self.max_frame_size));
        }
        Ok(())
    }
}

impl Decoder for StompCodec {
    type Item = StompItem;
    type Error = StompError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<StompItem>, StompError> {
        match src.first() {
            None => return Ok(None),
            Some(b'\n') => {
                src.advance(1);
                return Ok(Some(StompItem::Heartbeat));
            }
            Some(b'\r') => {
                if src.len() < 2 {
                    return Ok(None);
                }
                if src[1] != b'\n' {
                    return Err(StompError::malformed("carriage return without line feed"));
                }
                src.advance(2);
                return Ok(Some(StompItem::Heartbeat));
            }
            Some(_) => {}
        }

        let Some((head_len, body_start)) = find_head_end(src) else {
            self.check_size(src.len())?;
            return Ok(None);
        };

        let head = std::str::from_utf8(&src[..head_len])
            .map_err(|_| StompError::malformed("frame head is not valid UTF-8"))?;
        let mut lines = head.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line));

        let command = lines.next().unwrap_or_default().to_string();
        if command.is_empty() {
            return Err(StompError::malformed("missing command line"));
        }
        let escaped = uses_escaping(&command);

        let mut headers = Vec::new();
        for line in lines {
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| StompError::malformed(format!("header without colon: {:?}", line)))?;
            if escaped {
                headers.push((unescape(key)?, unescape(value)?));
            } else {
                headers.push((key.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| StompError::malformed(format!("invalid content-length: {:?}", v)))
            })
            .transpose()?;

        let (body_end, frame_end) = match content_length {
            Some(len) => {
                self.check_size(len)?;
                let body_end = body_start
                    .checked_add(len)
                    .ok_or_else(|| StompError::frame_too_large(len, self.max_frame_size))?;
                self.check_size(body_end.saturating_add(1))?;
                if src.len() <= body_end {
                    src.reserve(body_end + 1 - src.len());
                    return Ok(None);
                }
                if src[body_end] != 0 {
                    return Err(StompError::malformed("body not terminated by NUL after content-length"));
                }
                (body_end, body_end + 1)
            }
            None => match src[body_start..].iter().position(|b| *b == 0) {
                Some(offset) => (body_start + offset, body_start + offset + 1),
                None => {
                    self.check_size(src.len())?;
                    return Ok(None);
                }
            },
        };

        let raw = src.split_to(frame_end).freeze();
        let body = raw.slice(body_start..body_end);

        trace!(command = %command, headers = headers.len(), bytes = body.len(), "Decoded STOMP frame");

        Ok(Some(StompItem::Frame(Frame {
            command,
            headers,
            body,
        })))
    }
}

impl Encoder<StompItem> for StompCodec {
    type Error = StompError;

    fn encode(&mut self, item: StompItem, dst: &mut BytesMut) -> Result<(), StompError> {
        match item {
            StompItem::Heartbeat => dst.put_u8(b'\n'),
            StompItem::Frame(frame) => {
                let start = dst.len();
                encode_frame(&frame, dst);
                self.check_size(dst.len() - start)?;
            }
        }
        Ok(())
    }
}

fn encode_frame(frame: &Frame, dst: &mut BytesMut) {
    let escaped = frame.uses_escaping();

    dst.extend_from_slice(frame.command.as_bytes());
    dst.put_u8(b'\n');

    for (key, value) in &frame.headers {
        if escaped {
            dst.extend_from_slice(escape(key).as_bytes());
            dst.put_u8(b':');
            dst.extend_from_slice(escape(value).as_bytes());
        } else {
            dst.extend_from_slice(key.as_bytes());
            dst.put_u8(b':');
            dst.extend_from_slice(value.as_bytes());
        }
        dst.put_u8(b'\n');
    }

    if !frame.body.is_empty() && frame.get_header("content-length").is_none() {
        dst.extend_from_slice(format!("content-length:{}\n", frame.body.len()).as_bytes());
    }

    dst.put_u8(b'\n');
    dst.extend_from_slice(&frame.body);
    dst.put_u8(0);
}

/// Locate the blank line ending the frame head.
///
/// Returns `(head_len, body_start)` where `head_len` excludes the final EOL.
fn find_head_end(src: &[u8]) -> Option<(usize, usize)> {
    for (i, byte) in src.iter().enumerate() {
        if *byte != b'\n' {
            continue;
        }
        match (src.get(i + 1), src.get(i + 2)) {
            (Some(b'\n'), _) => return Some((i, i + 2)),
            (Some(b'\r'), Some(b'\n')) => return Some((i, i + 3)),
            _ => {}
        }
    }
    None
}

fn escape(value: &str) -> Cow<'_, str> {
    if !value.contains(['\\', '\n', '\r', ':']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 4);
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}

fn unescape(value: &str) -> Result<String, StompError> {
    if !value.contains('\\') {
        return Ok(value.to_string());
    }
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(StompError::malformed(format!(
                    "undefined escape sequence \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::commands;
    use proptest::prelude::*;

    fn decode_all(codec: &mut StompCodec, input: &[u8]) -> Vec<StompItem> {
        let mut buf = BytesMut::from(input);
        let mut items = Vec::new();
        while let Some(item) = codec.decode(&mut buf).unwrap() {
            items.push(item);
        }
        items
    }

    fn expect_frame(item: StompItem) -> Frame {
        match item {
            StompItem::Frame(frame) => frame,
            StompItem::Heartbeat => panic!("Expected frame, got heartbeat"),
        }
    }

    #[test]
    fn test_decode_connected_frame() {
        let mut codec = StompCodec::default();
        let items = decode_all(&mut codec, b"CONNECTED\nversion:1.2\nheart-beat:0,0\n\n\0");
        assert_eq!(items.len(), 1);

        let frame = expect_frame(items.into_iter().next().unwrap());
        assert!(frame.is(commands::CONNECTED));
        assert_eq!(frame.get_header("version"), Some("1.2"));
        assert_eq!(frame.get_header("heart-beat"), Some("0,0"));
        assert!(frame.body.is_empty());
    }

    #[test]
    fn test_decode_crlf_and_heartbeats() {
        let mut codec = StompCodec::default();
        let items = decode_all(
            &mut codec,
            b"\n\r\nMESSAGE\r\nsubscription:abc\r\n\r\nhello\0\n",
        );
        assert_eq!(items.len(), 4);
        assert_eq!(items[0], StompItem::Heartbeat);
        assert_eq!(items[1], StompItem::Heartbeat);
        assert_eq!(items[3], StompItem::Heartbeat);

        let frame = expect_frame(items[2].clone());
        assert_eq!(frame.get_header("subscription"), Some("abc"));
        assert_eq!(&frame.body[..], b"hello");
    }

    #[test]
    fn test_content_length_allows_embedded_nul() {
        let mut codec = StompCodec::default();
        let items = decode_all(&mut codec, b"MESSAGE\ncontent-length:5\n\nab\0cd\0");

        let frame = expect_frame(items.into_iter().next().unwrap());
        assert_eq!(&frame.body[..], b"ab\0cd");
    }

    #[test]
    fn test_partial_input_waits_for_more() {
        let mut codec = StompCodec::default();
        let mut buf = BytesMut::from(&b"MESSAGE\ncontent-length:10\n\n01234"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"56789\0");
        let frame = expect_frame(codec.decode(&mut buf).unwrap().unwrap());
        assert_eq!(&frame.body[..], b"0123456789");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_missing_nul_after_content_length_is_rejected() {
        let mut codec = StompCodec::default();
        let mut buf = BytesMut::from(&b"MESSAGE\ncontent-length:2\n\nabX"[..]);
        assert!(matches!(codec.decode(&mut buf), Err(StompError::Malformed { .. })));
    }

    #[test]
    fn test_frame_size_limit() {
        let mut codec = StompCodec::new(16);
        let mut buf = BytesMut::from(&b"MESSAGE\ncontent-length:64\n\n"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(StompError::FrameTooLarge { max: 16, .. })
        ));
    }

    #[test]
    fn test_huge_content_length_is_rejected() {
        let mut codec = StompCodec::default();
        let mut buf = BytesMut::from(&b"MESSAGE\ncontent-length:18446744073709551615\n\n"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(StompError::FrameTooLarge { size: usize::MAX, .. })
        ));

        // No limit configured: the offset itself must not overflow
        let mut codec = StompCodec::new(usize::MAX);
        let mut buf = BytesMut::from(&b"MESSAGE\ncontent-length:18446744073709551615\n\n\0"[..]);
        assert!(matches!(codec.decode(&mut buf), Err(StompError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_header_escaping() {
        let mut codec = StompCodec::default();
        let frame = Frame::new(commands::SEND)
            .header("destination", "a:b")
            .header("note", "line\nbreak\\");

        let mut buf = BytesMut::new();
        codec.encode(StompItem::Frame(frame.clone()), &mut buf).unwrap();
        assert!(buf.starts_with(b"SEND\ndestination:a\\cb\nnote:line\\nbreak\\\\\n\n\0"));

        let decoded = expect_frame(codec.decode(&mut buf).unwrap().unwrap());
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_connect_headers_are_not_escaped() {
        let mut codec = StompCodec::default();
        let frame = Frame::new(commands::CONNECT).header("host", "fe80::1");

        let mut buf = BytesMut::new();
        codec.encode(StompItem::Frame(frame), &mut buf).unwrap();
        assert_eq!(&buf[..], b"CONNECT\nhost:fe80::1\n\n\0");
    }

    #[test]
    fn test_undefined_escape_is_rejected() {
        let mut codec = StompCodec::default();
        let mut buf = BytesMut::from(&b"MESSAGE\nbad:\\t\n\n\0"[..]);
        assert!(matches!(codec.decode(&mut buf), Err(StompError::Malformed { .. })));
    }

    #[test]
    fn test_encoder_adds_content_length() {
        let mut codec = StompCodec::default();
        let frame = Frame::new(commands::SEND)
            .header("destination", "jms.topic.vdsm_requests")
            .with_body(&b"{}"[..]);

        let mut buf = BytesMut::new();
        codec.encode(StompItem::Frame(frame), &mut buf).unwrap();
        assert_eq!(
            &buf[..],
            b"SEND\ndestination:jms.topic.vdsm_requests\ncontent-length:2\n\n{}\0"
        );

        let mut buf = BytesMut::new();
        codec.encode(StompItem::Heartbeat, &mut buf).unwrap();
        assert_eq!(&buf[..], b"\n");
    }

    proptest! {
        #[test]
        fn prop_header_values_survive_escaping(value in "[ -~\n\r]{0,40}") {
            let mut codec = StompCodec::default();
            let frame = Frame::new(commands::MESSAGE).header("reply-to", value.clone());

            let mut buf = BytesMut::new();
            codec.encode(StompItem::Frame(frame), &mut buf).unwrap();
            let decoded = expect_frame(codec.decode(&mut buf).unwrap().unwrap());
            prop_assert_eq!(decoded.get_header("reply-to"), Some(value.as_str()));
        }
    }
}
