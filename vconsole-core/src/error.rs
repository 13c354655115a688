//! Domain-specific error types for the VConsole server.
//!
//! All fallible operations return `Result<T, VConsoleError>`.
//! Socket conditions that are part of normal non-blocking operation
//! ("would block", orderly close) are never reported through this type.

use std::net::SocketAddr;

use thiserror::Error;

/// The canonical error type for the VConsole protocol and server.
#[derive(Debug, Error)]
pub enum VConsoleError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// A field in a chunk header could not be parsed.
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    /// A payload was shorter than its fixed layout requires.
    #[error("truncated {packet} payload: need {needed} bytes, got {actual}")]
    TruncatedPayload {
        packet: &'static str,
        needed: usize,
        actual: usize,
    },

    /// A packet violated protocol rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Packet Errors ────────────────────────────────────────────
    /// The encoded packet does not fit the 16-bit length field.
    #[error("packet too large: {size} bytes (max {max})")]
    PacketTooLarge { size: usize, max: usize },

    /// The declared length disagrees with the bytes on hand.
    #[error("invalid packet length: declared {declared}, available {available}")]
    InvalidPacketLength { declared: usize, available: usize },

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The listening socket could not be opened.
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The bind address could not be resolved to a socket address.
    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),

    // ── Capture Errors ───────────────────────────────────────────
    /// Output capture is not available on this platform.
    #[error("output capture is not supported on this platform")]
    CaptureUnsupported,

    /// Redirecting a standard stream failed.
    #[error("output capture setup failed: {0}")]
    Capture(std::io::Error),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl VConsoleError {
    pub(crate) fn bind(addr: SocketAddr, source: std::io::Error) -> Self {
        VConsoleError::Bind {
            addr: addr.to_string(),
            source,
        }
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for VConsoleError {
    fn from(s: String) -> Self {
        VConsoleError::Other(s)
    }
}

impl From<&str> for VConsoleError {
    fn from(s: &str) -> Self {
        VConsoleError::Other(s.to_string())
    }
}
