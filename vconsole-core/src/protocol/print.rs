//! Console output protocol.
//!
//! # Wire Protocol
//!
//! ```text
//! Server ──[PRNT]──────────────────────────────► Client   (repeated)
//!   offset  0: channel_id  i32
//!   offset  4: reserved    [u8; 8]
//!   offset 12: color       u32 RGBA
//!   offset 16: reserved    [u8; 12]
//!   offset 28: text        NUL-terminated
//! ```
//!
//! There is no request/response correlation: output is pushed whenever
//! the server has some.

use bytes::{BufMut, BytesMut};

use crate::error::VConsoleError;
use crate::message::PacketType;
use crate::packet::{MAX_PAYLOAD_SIZE, Packet};

/// Colour for ordinary output (opaque white).
pub const COLOR_DEFAULT: u32 = 0xFFFF_FFFF;

/// Colour for captured standard-error output.
pub const COLOR_ERROR: u32 = 0xFFFF_0000;

/// Channel every line is printed on.
pub const DEFAULT_CHANNEL: i32 = 0;

const TEXT_OFFSET: usize = 28;

/// Longest text a single `PRNT` can carry (leaves room for the NUL).
pub const MAX_TEXT_LEN: usize = MAX_PAYLOAD_SIZE - TEXT_OFFSET - 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintMessage {
    pub channel_id: i32,
    pub color: u32,
    pub text: String,
}

impl PrintMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            channel_id: DEFAULT_CHANNEL,
            color: COLOR_DEFAULT,
            text: text.into(),
        }
    }

    pub fn with_channel(mut self, channel_id: i32) -> Self {
        self.channel_id = channel_id;
        self
    }

    pub fn with_color(mut self, color: u32) -> Self {
        self.color = color;
        self
    }

    /// Returns `true` for the red marker used on standard-error lines.
    pub fn is_error(&self) -> bool {
        self.color == COLOR_ERROR
    }

    /// Split into messages whose text fits a single `PRNT`, cutting on
    /// character boundaries. Channel and colour carry over to every piece.
    pub fn into_chunks(self) -> Vec<PrintMessage> {
        if self.text.len() <= MAX_TEXT_LEN {
            return vec![self];
        }
        let mut chunks = Vec::with_capacity(self.text.len() / MAX_TEXT_LEN + 1);
        let mut rest = self.text.as_str();
        while !rest.is_empty() {
            let mut end = rest.len().min(MAX_TEXT_LEN);
            while !rest.is_char_boundary(end) {
                end -= 1;
            }
            let (head, tail) = rest.split_at(end);
            chunks.push(PrintMessage {
                channel_id: self.channel_id,
                color: self.color,
                text: head.to_string(),
            });
            rest = tail;
        }
        chunks
    }

    /// Encode the payload. Text beyond [`MAX_TEXT_LEN`] bytes is cut at
    /// the last character boundary that fits; use [`into_chunks`] first
    /// to keep all of it.
    ///
    /// [`into_chunks`]: PrintMessage::into_chunks
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut end = self.text.len().min(MAX_TEXT_LEN);
        while !self.text.is_char_boundary(end) {
            end -= 1;
        }
        let text = &self.text.as_bytes()[..end];

        let mut buf = BytesMut::with_capacity(TEXT_OFFSET + text.len() + 1);
        buf.put_i32(self.channel_id);
        buf.put_bytes(0, 8);
        buf.put_u32(self.color);
        buf.put_bytes(0, 12);
        buf.put_slice(text);
        buf.put_u8(0);
        buf.to_vec()
    }

    /// Decode a `PRNT` payload. Text ends at the first NUL, or at the end
    /// of the payload if there is none.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VConsoleError> {
        if bytes.len() < TEXT_OFFSET {
            return Err(VConsoleError::TruncatedPayload {
                packet: "PRNT",
                needed: TEXT_OFFSET,
                actual: bytes.len(),
            });
        }
        let channel_id = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let color = u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        let raw = &bytes[TEXT_OFFSET..];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let text = String::from_utf8_lossy(&raw[..end]).into_owned();
        Ok(Self {
            channel_id,
            color,
            text,
        })
    }

    pub fn into_packet(self) -> Result<Packet, VConsoleError> {
        Packet::new(PacketType::Prnt, self.to_bytes())
    }
}
