//! In-memory transport for unit tests.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::VConsoleCodec;
use crate::network::transport::{ConsoleListener, ConsoleStream, Transport};
use crate::packet::Packet;

#[derive(Default)]
struct PeerState {
    to_server: VecDeque<u8>,
    from_server: BytesMut,
    closed_by_peer: bool,
    broken: bool,
    shut_down: bool,
    write_budget: Option<usize>,
}

/// The client end of an in-memory connection.
#[derive(Clone, Default)]
pub struct MockPeer {
    state: Arc<Mutex<PeerState>>,
}

impl MockPeer {
    pub fn send(&self, bytes: &[u8]) {
        self.state.lock().unwrap().to_server.extend(bytes);
    }

    pub fn send_packet(&self, packet: &Packet) {
        self.send(&packet.to_bytes());
    }

    /// Decode every complete packet the server has written so far.
    pub fn received(&self) -> Vec<Packet> {
        let mut state = self.state.lock().unwrap();
        let mut packets = Vec::new();
        while let Some(packet) = VConsoleCodec.decode(&mut state.from_server).unwrap() {
            packets.push(packet);
        }
        packets
    }

    pub fn close(&self) {
        self.state.lock().unwrap().closed_by_peer = true;
    }

    pub fn break_connection(&self) {
        self.state.lock().unwrap().broken = true;
    }

    /// Limit how many more bytes the server may write before blocking.
    pub fn set_write_budget(&self, budget: Option<usize>) {
        self.state.lock().unwrap().write_budget = budget;
    }

    pub fn was_shut_down(&self) -> bool {
        self.state.lock().unwrap().shut_down
    }
}

pub struct MockStream {
    peer: MockPeer,
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.peer.state.lock().unwrap();
        if state.broken {
            return Err(io::ErrorKind::ConnectionReset.into());
        }
        if state.to_server.is_empty() {
            return if state.closed_by_peer {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        }
        let n = buf.len().min(state.to_server.len());
        for (slot, byte) in buf.iter_mut().zip(state.to_server.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.peer.state.lock().unwrap();
        if state.broken || state.shut_down {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        let n = match state.write_budget {
            Some(0) => return Err(io::ErrorKind::WouldBlock.into()),
            Some(budget) => {
                let n = budget.min(buf.len());
                state.write_budget = Some(budget - n);
                n
            }
            None => buf.len(),
        };
        state.from_server.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ConsoleStream for MockStream {
    fn shutdown(&mut self) {
        self.peer.state.lock().unwrap().shut_down = true;
    }
}

#[derive(Default)]
struct Backlog {
    pending: Mutex<VecDeque<(MockPeer, SocketAddr)>>,
    open_listeners: AtomicUsize,
    listens: AtomicUsize,
    refuse: AtomicBool,
}

/// Transport whose "network" is a queue of pending [`MockPeer`]s.
#[derive(Clone, Default)]
pub struct MockTransport {
    backlog: Arc<Backlog>,
}

impl MockTransport {
    /// Queue a connection. Returns `None` (refused) while nothing listens.
    pub fn connect(&self, port: u16) -> Option<MockPeer> {
        if self.backlog.open_listeners.load(Ordering::SeqCst) == 0 {
            return None;
        }
        let peer = MockPeer::default();
        let addr = SocketAddr::from(([10, 0, 0, 1], port));
        self.backlog
            .pending
            .lock()
            .unwrap()
            .push_back((peer.clone(), addr));
        Some(peer)
    }

    pub fn is_listening(&self) -> bool {
        self.backlog.open_listeners.load(Ordering::SeqCst) > 0
    }

    /// How many times `listen` succeeded.
    pub fn listen_count(&self) -> usize {
        self.backlog.listens.load(Ordering::SeqCst)
    }

    pub fn refuse_listen(&self, refuse: bool) {
        self.backlog.refuse.store(refuse, Ordering::SeqCst);
    }
}

pub struct MockListener {
    backlog: Arc<Backlog>,
    addr: SocketAddr,
}

impl Drop for MockListener {
    fn drop(&mut self) {
        self.backlog.open_listeners.fetch_sub(1, Ordering::SeqCst);
        // Connections nobody accepted die with the listening socket.
        for (peer, _) in self.backlog.pending.lock().unwrap().drain(..) {
            peer.break_connection();
        }
    }
}

impl ConsoleListener for MockListener {
    type Stream = MockStream;

    fn try_accept(&self) -> io::Result<Option<(MockStream, SocketAddr)>> {
        let next = self.backlog.pending.lock().unwrap().pop_front();
        Ok(next.map(|(peer, addr)| (MockStream { peer }, addr)))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}

impl Transport for MockTransport {
    type Stream = MockStream;
    type Listener = MockListener;

    fn listen(&self, addr: SocketAddr) -> io::Result<MockListener> {
        if self.backlog.refuse.load(Ordering::SeqCst) {
            return Err(io::ErrorKind::AddrInUse.into());
        }
        self.backlog.open_listeners.fetch_add(1, Ordering::SeqCst);
        self.backlog.listens.fetch_add(1, Ordering::SeqCst);
        Ok(MockListener {
            backlog: Arc::clone(&self.backlog),
            addr,
        })
    }
}
