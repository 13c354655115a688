//! Stream framing for VConsole chunks.
//!
//! Used by the server over each client's reassembly buffer and by
//! clients through `tokio_util::codec::Framed`.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::VConsoleError;
use crate::header::{ChunkHeader, HEADER_SIZE, PROTOCOL_VERSION};
use crate::packet::Packet;

#[derive(Debug, Default, Clone, Copy)]
pub struct VConsoleCodec;

impl Decoder for VConsoleCodec {
    type Item = Packet;
    type Error = VConsoleError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = ChunkHeader::from_bytes(&src[..HEADER_SIZE])?;
        if src.len() < header.length() {
            src.reserve(header.length() - src.len());
            return Ok(None);
        }

        let frame = src.split_to(header.length());
        let packet = Packet::from_bytes(&frame)?;
        Ok(Some(packet))
    }
}

impl Encoder<Packet> for VConsoleCodec {
    type Error = VConsoleError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst);
        Ok(())
    }
}

impl Encoder<&Packet> for VConsoleCodec {
    type Error = VConsoleError;

    fn encode(&mut self, item: &Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst);
        Ok(())
    }
}

/// Throw away everything buffered after a malformed header.
///
/// A bad length field leaves no way to find the next chunk boundary.
pub fn discard_unframed(src: &mut BytesMut) -> usize {
    let dropped = src.len();
    src.advance(dropped);
    dropped
}

/// Drop the frame at the front of `src` and skip ahead to the next
/// plausible chunk header.
///
/// A plausible header carries [`PROTOCOL_VERSION`] and a length that
/// covers the header. Everything before it is discarded, or the whole
/// buffer if none is found. Returns the number of bytes dropped.
pub fn skip_to_next_header(src: &mut BytesMut) -> usize {
    let next = (1..src.len().saturating_sub(HEADER_SIZE - 1)).find(|&at| {
        let candidate = &src[at..at + HEADER_SIZE];
        candidate[4..8] == PROTOCOL_VERSION.to_be_bytes()
            && ChunkHeader::from_bytes(candidate).is_ok()
    });
    let dropped = next.unwrap_or(src.len());
    src.advance(dropped);
    dropped
}
