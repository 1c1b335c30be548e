//! Content-Length framing for DAP messages
//!
//! ```text
//! Content-Length: 119\r\n
//! \r\n
//! {"seq":1,"type":"request","command":"initialize","arguments":{"adapterID":"python"}}
//! ```
//!
//! Decoding works on a growing byte buffer so that partial reads, and many
//! messages arriving in one read, both come out as whole messages in order.

use crate::{DapError, ProtocolMessage, Result};
use tracing::warn;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const CONTENT_LENGTH: &str = "content-length";

/// Frame a message for the wire. The length is the UTF-8 byte count of the body.
pub fn encode(message: &ProtocolMessage) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(message)?;
    let mut framed = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    framed.extend_from_slice(&body);
    Ok(framed)
}

#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes received but not yet consumed as a complete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Next complete message, or `None` when more bytes are needed.
    ///
    /// A body that fails to parse yields `Some(Err(DapError::Decode))` and is
    /// consumed; the following frames are unaffected.
    pub fn next_message(&mut self) -> Option<Result<ProtocolMessage>> {
        loop {
            let header_end = find_terminator(&self.buffer)?;
            let body_start = header_end + HEADER_TERMINATOR.len();

            let frame_end = parse_content_length(&self.buffer[..header_end])
                .and_then(|length| body_start.checked_add(length));
            let Some(frame_end) = frame_end else {
                warn!(
                    header = %String::from_utf8_lossy(&self.buffer[..header_end]),
                    "Discarding DAP frame with malformed header"
                );
                self.buffer.drain(..body_start);
                continue;
            };

            if self.buffer.len() < frame_end {
                return None;
            }

            let frame: Vec<u8> = self.buffer.drain(..frame_end).collect();
            let body = &frame[body_start..];
            return Some(
                serde_json::from_slice::<ProtocolMessage>(body)
                    .map_err(|e| DapError::Decode(e.to_string())),
            );
        }
    }

    /// Drain every complete message currently buffered.
    pub fn decode_available(&mut self) -> Vec<Result<ProtocolMessage>> {
        std::iter::from_fn(|| self.next_message()).collect()
    }
}

fn find_terminator(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
}

fn parse_content_length(header: &[u8]) -> Option<usize> {
    let text = std::str::from_utf8(header).ok()?;
    text.split("\r\n").find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            value.trim().parse::<usize>().ok()
        } else {
            None
        }
    })
}
