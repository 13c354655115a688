//! The live client collection.
//!
//! Every method takes the collection lock for its whole duration and
//! releases it before returning; nothing here calls back into the host
//! or logs through the server. The server runs on one logical thread
//! today; the lock keeps broadcast and the tick's accept/read/prune
//! steps correct if either is ever entered re-entrantly or from another
//! thread.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::VConsoleError;
use crate::network::client::{Client, ClientId, ClientInfo, ReadOutcome};
use crate::network::transport::ConsoleStream;
use crate::packet::Packet;

/// Why a client left the registry.
#[derive(Debug)]
pub enum DisconnectReason {
    /// The peer closed its end.
    Closed,
    /// A read or write failed.
    Broken(io::Error),
    /// The server is shutting down.
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Closed => write!(f, "closed by peer"),
            DisconnectReason::Broken(e) => write!(f, "connection broken: {e}"),
            DisconnectReason::Shutdown => write!(f, "server shutdown"),
        }
    }
}

/// Something that happened to a client during a poll.
#[derive(Debug)]
pub enum ClientEvent {
    /// A complete packet arrived.
    Packet(ClientInfo, Packet),
    /// Buffered input was unframeable and has been dropped.
    Malformed {
        client: ClientInfo,
        error: VConsoleError,
    },
    /// The client was removed.
    Disconnected(ClientInfo, DisconnectReason),
}

pub struct ClientRegistry<S: ConsoleStream> {
    clients: Mutex<Vec<Client<S>>>,
    next_id: AtomicU64,
}

impl<S: ConsoleStream> Default for ClientRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ConsoleStream> ClientRegistry<S> {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Client<S>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clients(&self) -> Vec<ClientInfo> {
        self.lock().iter().map(Client::info).collect()
    }

    /// Add an accepted stream and send it `greeting` before anyone else
    /// can write to it.
    ///
    /// Returns the new client and the collection size after insertion.
    /// A client whose greeting cannot be sent is removed again and the
    /// send error returned.
    pub fn admit(
        &self,
        stream: S,
        addr: SocketAddr,
        greeting: &[Packet],
    ) -> Result<(ClientInfo, usize), (ClientInfo, io::Error)> {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut clients = self.lock();
        clients.push(Client::new(id, stream, addr));
        let count = clients.len();

        let sent = match clients.last_mut() {
            Some(client) => greeting
                .iter()
                .try_for_each(|packet| client.send_packet(packet))
                .map(|()| client.info()),
            None => return Err((ClientInfo { id, addr }, io::ErrorKind::NotFound.into())),
        };
        match sent {
            Ok(info) => Ok((info, count)),
            Err(e) => {
                if let Some(mut client) = clients.pop() {
                    client.close();
                }
                Err((ClientInfo { id, addr }, e))
            }
        }
    }

    /// Send `packet` to every client. Clients whose socket fails are
    /// removed after the pass and reported.
    pub fn broadcast(&self, packet: &Packet) -> Vec<(ClientInfo, DisconnectReason)> {
        let mut clients = self.lock();
        let mut failed = Vec::new();
        for client in clients.iter_mut() {
            if let Err(e) = client.send_packet(packet) {
                failed.push((client.id(), DisconnectReason::Broken(e)));
            }
        }
        Self::remove_locked(&mut clients, failed)
    }

    /// One service pass over every client: flush pending output, make a
    /// single receive attempt, and decode whatever complete packets are
    /// buffered. Dead clients are pruned after the scan.
    pub fn poll(&self) -> Vec<ClientEvent> {
        let mut clients = self.lock();
        let mut events = Vec::new();
        let mut dead = Vec::new();

        for client in clients.iter_mut() {
            if let Err(e) = client.flush() {
                dead.push((client.id(), DisconnectReason::Broken(e)));
                continue;
            }
            match client.read_once() {
                ReadOutcome::Idle => {
                    // A partial frame the peer stopped feeding is dropped
                    // so it cannot swallow later traffic.
                    if let Some(error) = client.drop_stalled_frame() {
                        events.push(ClientEvent::Malformed {
                            client: client.info(),
                            error,
                        });
                        Self::decode_buffered(client, &mut events);
                    }
                }
                ReadOutcome::Closed => dead.push((client.id(), DisconnectReason::Closed)),
                ReadOutcome::Broken(e) => dead.push((client.id(), DisconnectReason::Broken(e))),
                ReadOutcome::Data(_) => Self::decode_buffered(client, &mut events),
            }
        }

        events.extend(
            Self::remove_locked(&mut clients, dead)
                .into_iter()
                .map(|(info, reason)| ClientEvent::Disconnected(info, reason)),
        );
        events
    }

    /// Close and drop every client.
    pub fn close_all(&self) -> Vec<ClientInfo> {
        let mut clients = self.lock();
        clients
            .drain(..)
            .map(|mut client| {
                client.close();
                client.info()
            })
            .collect()
    }

    fn decode_buffered(client: &mut Client<S>, events: &mut Vec<ClientEvent>) {
        loop {
            match client.next_packet() {
                Ok(Some(packet)) => events.push(ClientEvent::Packet(client.info(), packet)),
                Ok(None) => break,
                Err(error) => {
                    events.push(ClientEvent::Malformed {
                        client: client.info(),
                        error,
                    });
                    break;
                }
            }
        }
    }

    fn remove_locked(
        clients: &mut Vec<Client<S>>,
        doomed: Vec<(ClientId, DisconnectReason)>,
    ) -> Vec<(ClientInfo, DisconnectReason)> {
        let mut removed = Vec::with_capacity(doomed.len());
        for (id, reason) in doomed {
            if let Some(pos) = clients.iter().position(|c| c.id() == id) {
                let mut client = clients.remove(pos);
                client.close();
                removed.push((client.info(), reason));
            }
        }
        removed
    }
}
