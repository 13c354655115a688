//! Handshake payloads — sent to every client right after accept.
//!
//! # Wire Protocol
//!
//! ```text
//! Server ──[AINF]──────────────────────────────► Client
//!   Payload: 77 reserved bytes, all zero
//!
//! Server ──[ADON]──────────────────────────────► Client
//!   Payload: reserved u16 (0) + name_len u16 + name bytes
//!
//! Server ──[CHAN]──────────────────────────────► Client
//!   Payload: count u16 + count × ChannelDescriptor (58 bytes each)
//! ```
//!
//! All integers are big-endian. Reserved fields are kept opaque: this
//! implementation writes zeros and never interprets what it reads.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::VConsoleError;
use crate::message::PacketType;
use crate::packet::Packet;

/// Name advertised in the `ADON` packet.
pub const SERVER_NAME: &str = "HLDS";

/// Name of the single channel advertised in `CHAN`.
pub const CONSOLE_CHANNEL_NAME: &str = "Console";

/// Fixed width of a channel name, NUL padded.
pub const CHANNEL_NAME_LEN: usize = 34;

const APP_INFO_LEN: usize = 77;

// ── AINF ──────────────────────────────────────────────────────────

/// Application info block. Its contents are unknown; it is all zeros.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    pub reserved: [u8; APP_INFO_LEN],
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            reserved: [0; APP_INFO_LEN],
        }
    }
}

impl AppInfo {
    pub const SIZE: usize = APP_INFO_LEN;

    pub fn to_bytes(&self) -> Vec<u8> {
        self.reserved.to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VConsoleError> {
        let reserved = bytes
            .get(..Self::SIZE)
            .and_then(|b| <[u8; APP_INFO_LEN]>::try_from(b).ok())
            .ok_or(VConsoleError::TruncatedPayload {
                packet: "AINF",
                needed: Self::SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self { reserved })
    }

    pub fn into_packet(self) -> Result<Packet, VConsoleError> {
        Packet::new(PacketType::Ainf, self.to_bytes())
    }
}

// ── ADON ──────────────────────────────────────────────────────────

/// Add-on announcement carrying the application name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOn {
    pub reserved: u16,
    pub name: String,
}

impl AddOn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            reserved: 0,
            name: name.into(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, VConsoleError> {
        let name_len = u16::try_from(self.name.len())
            .map_err(|_| VConsoleError::ProtocolViolation("ADON name longer than 65535 bytes"))?;
        let mut buf = BytesMut::with_capacity(4 + self.name.len());
        buf.put_u16(self.reserved);
        buf.put_u16(name_len);
        buf.put_slice(self.name.as_bytes());
        Ok(buf.to_vec())
    }

    /// Decode an `ADON` payload. A name length running past the payload
    /// is clamped to the bytes present.
    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self, VConsoleError> {
        if bytes.remaining() < 4 {
            return Err(VConsoleError::TruncatedPayload {
                packet: "ADON",
                needed: 4,
                actual: bytes.len(),
            });
        }
        let reserved = bytes.get_u16();
        let name_len = (bytes.get_u16() as usize).min(bytes.remaining());
        let name = String::from_utf8_lossy(&bytes[..name_len]).into_owned();
        Ok(Self { reserved, name })
    }

    pub fn into_packet(self) -> Result<Packet, VConsoleError> {
        Packet::new(PacketType::Adon, self.to_bytes()?)
    }
}

// ── CHAN ──────────────────────────────────────────────────────────

/// One logical output channel as advertised to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    pub id: i32,
    pub reserved1: i32,
    pub reserved2: i32,
    pub verbosity_default: i32,
    pub verbosity_current: i32,
    /// RGBA colour override for the channel's text.
    pub text_rgba_override: u32,
    pub name: String,
}

impl ChannelDescriptor {
    /// Encoded size on the wire.
    pub const SIZE: usize = 6 * 4 + CHANNEL_NAME_LEN;

    /// The one channel this server exposes.
    pub fn console() -> Self {
        Self {
            id: 0,
            reserved1: 0,
            reserved2: 0,
            verbosity_default: 1,
            verbosity_current: 1,
            text_rgba_override: crate::protocol::print::COLOR_DEFAULT,
            name: CONSOLE_CHANNEL_NAME.to_string(),
        }
    }

    /// Append the fixed-width encoding. Names longer than 33 bytes are
    /// cut so the field always keeps a terminating NUL.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_i32(self.id);
        buf.put_i32(self.reserved1);
        buf.put_i32(self.reserved2);
        buf.put_i32(self.verbosity_default);
        buf.put_i32(self.verbosity_current);
        buf.put_u32(self.text_rgba_override);

        let mut name = [0u8; CHANNEL_NAME_LEN];
        let raw = self.name.as_bytes();
        let n = raw.len().min(CHANNEL_NAME_LEN - 1);
        name[..n].copy_from_slice(&raw[..n]);
        buf.put_slice(&name);
    }

    pub fn decode(bytes: &mut &[u8]) -> Result<Self, VConsoleError> {
        if bytes.remaining() < Self::SIZE {
            return Err(VConsoleError::TruncatedPayload {
                packet: "CHAN",
                needed: Self::SIZE,
                actual: bytes.remaining(),
            });
        }
        let id = bytes.get_i32();
        let reserved1 = bytes.get_i32();
        let reserved2 = bytes.get_i32();
        let verbosity_default = bytes.get_i32();
        let verbosity_current = bytes.get_i32();
        let text_rgba_override = bytes.get_u32();
        let raw = &bytes[..CHANNEL_NAME_LEN];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(CHANNEL_NAME_LEN);
        let name = String::from_utf8_lossy(&raw[..end]).into_owned();
        bytes.advance(CHANNEL_NAME_LEN);
        Ok(Self {
            id,
            reserved1,
            reserved2,
            verbosity_default,
            verbosity_current,
            text_rgba_override,
            name,
        })
    }
}

/// The `CHAN` payload: a counted list of channel descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelList {
    pub channels: Vec<ChannelDescriptor>,
}

impl Default for ChannelList {
    fn default() -> Self {
        Self {
            channels: vec![ChannelDescriptor::console()],
        }
    }
}

impl ChannelList {
    pub fn to_bytes(&self) -> Result<Vec<u8>, VConsoleError> {
        let count = u16::try_from(self.channels.len())
            .map_err(|_| VConsoleError::ProtocolViolation("too many channels"))?;
        let mut buf = BytesMut::with_capacity(2 + self.channels.len() * ChannelDescriptor::SIZE);
        buf.put_u16(count);
        for channel in &self.channels {
            channel.encode_into(&mut buf);
        }
        Ok(buf.to_vec())
    }

    /// Decode a `CHAN` payload. Descriptors that the count promises but
    /// the payload does not hold are an error.
    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self, VConsoleError> {
        if bytes.remaining() < 2 {
            return Err(VConsoleError::TruncatedPayload {
                packet: "CHAN",
                needed: 2,
                actual: bytes.len(),
            });
        }
        let count = bytes.get_u16() as usize;
        let mut channels = Vec::with_capacity(count.min(bytes.remaining() / ChannelDescriptor::SIZE));
        for _ in 0..count {
            channels.push(ChannelDescriptor::decode(&mut bytes)?);
        }
        Ok(Self { channels })
    }

    pub fn into_packet(self) -> Result<Packet, VConsoleError> {
        Packet::new(PacketType::Chan, self.to_bytes()?)
    }
}

/// The three packets every client receives on connect, in order.
pub fn handshake_packets() -> Result<[Packet; 3], VConsoleError> {
    Ok([
        AppInfo::default().into_packet()?,
        AddOn::new(SERVER_NAME).into_packet()?,
        ChannelList::default().into_packet()?,
    ])
}
