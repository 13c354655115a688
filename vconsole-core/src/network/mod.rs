//! Sockets, clients and the client collection.

pub mod client;
pub mod listener;
pub mod registry;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use client::{ClientId, ClientInfo, RECV_BUFFER_SIZE};
pub use listener::{Acceptor, resolve_bind_addr};
pub use registry::{ClientEvent, ClientRegistry, DisconnectReason};
pub use transport::{ConsoleListener, ConsoleStream, TcpTransport, Transport};
