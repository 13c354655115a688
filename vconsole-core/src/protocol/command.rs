//! Console command protocol.
//!
//! ```text
//! Client ──[CMND]──────────────────────────────► Server
//!   Payload: command text, NUL-terminated or running to the payload end
//! ```

use bytes::{BufMut, BytesMut};

use crate::error::VConsoleError;
use crate::message::PacketType;
use crate::packet::Packet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub command: String,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Encode as text plus a terminating NUL.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.command.len() + 1);
        buf.put_slice(self.command.as_bytes());
        buf.put_u8(0);
        buf.to_vec()
    }

    /// Extract the command from a `CMND` payload.
    ///
    /// The text stops at the first NUL or at the end of the payload.
    /// Non-UTF-8 bytes are replaced rather than rejected.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Self {
            command: String::from_utf8_lossy(&bytes[..end]).into_owned(),
        }
    }

    /// Pull the command out of a framed packet.
    pub fn from_packet(packet: &Packet) -> Result<Self, VConsoleError> {
        if packet.packet_type() != PacketType::Cmnd {
            return Err(VConsoleError::ProtocolViolation("not a CMND packet"));
        }
        Ok(Self::from_bytes(packet.payload()))
    }

    pub fn is_empty(&self) -> bool {
        self.command.is_empty()
    }

    pub fn into_packet(self) -> Result<Packet, VConsoleError> {
        Packet::new(PacketType::Cmnd, self.to_bytes())
    }
}
