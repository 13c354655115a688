//! The fixed chunk header that precedes every VConsole packet.
//!
//! ```text
//! type:     [u8; 4]  ASCII tag                        (4)
//! version:  u32 BE   always PROTOCOL_VERSION          (4)
//! length:   u16 BE   header + payload                 (2)
//! handle:   u16 BE   opaque, always 0 from this side  (2)
//! ```

use crate::error::VConsoleError;
use crate::message::PacketType;

/// Encoded size of a chunk header on the wire.
pub const HEADER_SIZE: usize = 12;

/// Protocol version stamped on every outbound chunk.
pub const PROTOCOL_VERSION: u32 = 0x0000_00D4;

pub type ChunkHeaderBytes = [u8; HEADER_SIZE];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    packet_type: PacketType,
    version: u32,
    length: u16,
    handle: u16,
}

impl ChunkHeader {
    /// Header for a chunk carrying `payload_len` bytes of payload.
    pub fn new(packet_type: PacketType, payload_len: usize) -> Result<Self, VConsoleError> {
        let total = HEADER_SIZE + payload_len;
        let length = u16::try_from(total).map_err(|_| VConsoleError::PacketTooLarge {
            size: total,
            max: u16::MAX as usize,
        })?;
        Ok(Self {
            packet_type,
            version: PROTOCOL_VERSION,
            length,
            handle: 0,
        })
    }

    pub fn to_bytes(&self) -> ChunkHeaderBytes {
        let mut header: ChunkHeaderBytes = [0; HEADER_SIZE];
        header[0..4].copy_from_slice(&self.packet_type.tag());
        header[4..8].copy_from_slice(&self.version.to_be_bytes());
        header[8..10].copy_from_slice(&self.length.to_be_bytes());
        header[10..12].copy_from_slice(&self.handle.to_be_bytes());
        header
    }

    /// Parse a header from the front of `bytes`.
    ///
    /// Needs at least [`HEADER_SIZE`] bytes and a declared length that
    /// covers the header itself. Whether the payload is actually present
    /// is the caller's check.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VConsoleError> {
        if bytes.len() < HEADER_SIZE {
            return Err(VConsoleError::InvalidPacketLength {
                declared: HEADER_SIZE,
                available: bytes.len(),
            });
        }
        let tag = [bytes[0], bytes[1], bytes[2], bytes[3]];
        let version = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let length = u16::from_be_bytes([bytes[8], bytes[9]]);
        let handle = u16::from_be_bytes([bytes[10], bytes[11]]);
        if (length as usize) < HEADER_SIZE {
            return Err(VConsoleError::InvalidHeader(
                "declared length is shorter than the header",
            ));
        }
        Ok(Self {
            packet_type: PacketType::from(tag),
            version,
            length,
            handle,
        })
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Total declared length, header included.
    pub fn length(&self) -> usize {
        self.length as usize
    }

    pub fn payload_len(&self) -> usize {
        self.length as usize - HEADER_SIZE
    }

    pub fn handle(&self) -> u16 {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_big_endian() {
        let header = ChunkHeader::new(PacketType::Prnt, 4).unwrap();
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], b"PRNT");
        assert_eq!(&bytes[4..8], &[0x00, 0x00, 0x00, 0xD4]);
        assert_eq!(&bytes[8..10], &[0x00, 16]);
        assert_eq!(&bytes[10..12], &[0x00, 0x00]);
    }

    #[test]
    fn parse_back() {
        let header = ChunkHeader::new(PacketType::Cmnd, 7).unwrap();
        let parsed = ChunkHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.length(), HEADER_SIZE + 7);
        assert_eq!(parsed.payload_len(), 7);
        assert_eq!(parsed.version(), PROTOCOL_VERSION);
        assert_eq!(parsed.handle(), 0);
    }

    #[test]
    fn short_buffer_is_rejected() {
        for len in 0..HEADER_SIZE {
            let buf = vec![0u8; len];
            assert!(ChunkHeader::from_bytes(&buf).is_err(), "len {len}");
        }
    }

    #[test]
    fn length_below_header_is_rejected() {
        let mut bytes = ChunkHeader::new(PacketType::Cmnd, 0).unwrap().to_bytes();
        bytes[8..10].copy_from_slice(&11u16.to_be_bytes());
        assert!(matches!(
            ChunkHeader::from_bytes(&bytes),
            Err(VConsoleError::InvalidHeader(_))
        ));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        assert!(ChunkHeader::new(PacketType::Prnt, u16::MAX as usize).is_err());
        assert!(ChunkHeader::new(PacketType::Prnt, u16::MAX as usize - HEADER_SIZE).is_ok());
    }
}
