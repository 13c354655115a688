//! # vconsole-core
//!
//! Embeddable server for the VConsole remote-console protocol.
//!
//! This crate contains:
//! - **Protocol types**: `ChunkHeader`, `Packet`, `PacketType`
//! - **Protocol payloads**: handshake (`AINF`/`ADON`/`CHAN`), `CMND` and `PRNT`
//! - **Codec**: `VConsoleCodec` for framed I/O via `tokio_util`
//! - **Network**: the `Transport` abstraction, listener and client registry
//! - **Capture**: stdout/stderr redirection and line reassembly
//! - **Bridge**: the `HostConsole` trait commands are forwarded to
//! - **Server**: `VConsoleServer`, driven by one `tick()` per host frame
//! - **Error**: `VConsoleError`, a typed `thiserror`-based error enum

pub mod bridge;
pub mod capture;
pub mod codec;
pub mod error;
pub mod header;
pub mod message;
pub mod network;
pub mod packet;
pub mod protocol;
pub mod server;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use bridge::{HostConsole, execute_server_command};
pub use capture::{LocalSink, LocalWriter, OutputCapture, Redirect};
pub use codec::VConsoleCodec;
pub use error::VConsoleError;
pub use header::{ChunkHeader, HEADER_SIZE, PROTOCOL_VERSION};
pub use message::PacketType;
pub use network::{ClientId, ClientInfo, TcpTransport, Transport};
pub use packet::{MAX_PAYLOAD_SIZE, Packet};
pub use protocol::{COLOR_DEFAULT, COLOR_ERROR, CommandRequest, PrintMessage};
pub use server::{DEFAULT_BIND, DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT, VConsoleServer};
