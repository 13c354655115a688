//! A single attached console client.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::debug;

use crate::codec::{VConsoleCodec, discard_unframed, skip_to_next_header};
use crate::error::VConsoleError;
use crate::header::{ChunkHeader, HEADER_SIZE};
use crate::network::transport::{ConsoleStream, is_transient};
use crate::packet::Packet;

/// Bytes received per client per tick.
pub const RECV_BUFFER_SIZE: usize = 4096;

/// Unsent output a client may accumulate before it is dropped.
pub const MAX_OUTBOUND_BACKLOG: usize = 1024 * 1024;

/// Identity of a live client. Unique for the lifetime of the registry,
/// so it plays the role of the socket handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Who a client is, detached from its socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientInfo {
    pub id: ClientId,
    pub addr: SocketAddr,
}

impl ClientInfo {
    pub fn ip(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

impl fmt::Display for ClientInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr.ip(), self.addr.port())
    }
}

/// Result of one non-blocking receive attempt.
#[derive(Debug)]
pub enum ReadOutcome {
    /// Bytes were appended to the inbound buffer.
    Data(usize),
    /// Nothing pending.
    Idle,
    /// The peer performed an orderly close.
    Closed,
    /// The connection is unusable.
    Broken(io::Error),
}

pub struct Client<S: ConsoleStream> {
    info: ClientInfo,
    stream: S,
    inbound: BytesMut,
    outbound: BytesMut,
}

impl<S: ConsoleStream> Client<S> {
    pub fn new(id: ClientId, stream: S, addr: SocketAddr) -> Self {
        Self {
            info: ClientInfo { id, addr },
            stream,
            inbound: BytesMut::with_capacity(RECV_BUFFER_SIZE),
            outbound: BytesMut::new(),
        }
    }

    pub fn info(&self) -> ClientInfo {
        self.info
    }

    pub fn id(&self) -> ClientId {
        self.info.id
    }

    /// Queue an encoded packet and push out as much as the socket takes.
    pub fn send_packet(&mut self, packet: &Packet) -> io::Result<()> {
        packet.encode_into(&mut self.outbound);
        self.flush()
    }

    /// Write queued output until it is gone or the socket would block.
    ///
    /// Fails if the socket is broken or the backlog outgrew
    /// [`MAX_OUTBOUND_BACKLOG`].
    pub fn flush(&mut self) -> io::Result<()> {
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => self.outbound.advance(n),
                Err(e) if is_transient(&e) => break,
                Err(e) => return Err(e),
            }
        }
        if self.outbound.len() > MAX_OUTBOUND_BACKLOG {
            return Err(io::Error::other(format!(
                "outbound backlog of {} bytes exceeds {}",
                self.outbound.len(),
                MAX_OUTBOUND_BACKLOG
            )));
        }
        Ok(())
    }

    pub fn pending_outbound(&self) -> usize {
        self.outbound.len()
    }

    /// One receive attempt of at most [`RECV_BUFFER_SIZE`] bytes.
    pub fn read_once(&mut self) -> ReadOutcome {
        let mut scratch = [0u8; RECV_BUFFER_SIZE];
        match self.stream.read(&mut scratch) {
            Ok(0) => ReadOutcome::Closed,
            Ok(n) => {
                self.inbound.extend_from_slice(&scratch[..n]);
                ReadOutcome::Data(n)
            }
            Err(e) if is_transient(&e) => ReadOutcome::Idle,
            Err(e) => ReadOutcome::Broken(e),
        }
    }

    /// Next complete packet from the inbound buffer, if any.
    ///
    /// On a malformed header the buffered bytes are discarded, since
    /// the next chunk boundary cannot be found.
    pub fn next_packet(&mut self) -> Result<Option<Packet>, VConsoleError> {
        match VConsoleCodec.decode(&mut self.inbound) {
            Ok(packet) => Ok(packet),
            Err(e) => {
                discard_unframed(&mut self.inbound);
                Err(e)
            }
        }
    }

    /// Give up on a frame that is still incomplete once the peer has
    /// nothing more to send.
    ///
    /// The stalled frame is dropped and decoding resumes at the next
    /// plausible header behind it. Returns `None` if nothing was pending.
    pub fn drop_stalled_frame(&mut self) -> Option<VConsoleError> {
        if self.inbound.is_empty() {
            return None;
        }
        let available = self.inbound.len();
        let declared = ChunkHeader::from_bytes(&self.inbound)
            .map(|header| header.length())
            .unwrap_or(HEADER_SIZE);
        skip_to_next_header(&mut self.inbound);
        Some(VConsoleError::InvalidPacketLength {
            declared,
            available,
        })
    }

    pub fn buffered_inbound(&self) -> usize {
        self.inbound.len()
    }

    /// Shut the socket down. The client is dropped right after.
    pub fn close(&mut self) {
        if let Err(e) = self.flush() {
            debug!(client = %self.info, error = %e, "final flush failed");
        }
        self.stream.shutdown();
    }
}
