use std::fmt::Debug;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::VConsoleError;
use crate::header::{ChunkHeader, HEADER_SIZE};
use crate::message::PacketType;

/// Largest payload that still fits the 16-bit length field.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize - HEADER_SIZE;

/// One framed protocol message: header plus type-specific payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    header: ChunkHeader,
    payload: Bytes,
}

impl Packet {
    pub fn new(packet_type: PacketType, payload: impl Into<Bytes>) -> Result<Self, VConsoleError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(VConsoleError::PacketTooLarge {
                size: HEADER_SIZE + payload.len(),
                max: u16::MAX as usize,
            });
        }
        let header = ChunkHeader::new(packet_type, payload.len())?;
        Ok(Self { header, payload })
    }

    pub fn header(&self) -> &ChunkHeader {
        &self.header
    }

    pub fn packet_type(&self) -> PacketType {
        self.header.packet_type()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Encoded size, header included.
    pub fn len(&self) -> usize {
        self.header.length()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(self.len());
        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Decode the packet at the front of `bytes`.
    ///
    /// Only the declared length is consumed; anything after it belongs to
    /// the next packet and is left alone. A declared length larger than
    /// what `bytes` holds is an error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VConsoleError> {
        let header = ChunkHeader::from_bytes(bytes)?;
        if header.length() > bytes.len() {
            return Err(VConsoleError::InvalidPacketLength {
                declared: header.length(),
                available: bytes.len(),
            });
        }
        let payload = Bytes::copy_from_slice(&bytes[HEADER_SIZE..header.length()]);
        Ok(Self { header, payload })
    }
}

impl Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("type", &self.packet_type().to_string())
            .field("length", &self.len())
            .field("payload", &self.payload)
            .finish()
    }
}
