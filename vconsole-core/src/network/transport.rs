//! Socket abstraction the server is written against.
//!
//! The server never touches a platform socket API directly. It asks a
//! [`Transport`] for a listener, accepts [`ConsoleStream`]s from it and
//! drives them with non-blocking reads and writes. [`TcpTransport`] is
//! the production implementation over `std::net`, which already picks
//! the right socket API for the target platform at build time.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};

/// A connected, non-blocking client stream.
///
/// `read`/`write` must return `ErrorKind::WouldBlock` instead of
/// stalling; `read` returning `Ok(0)` means the peer closed.
pub trait ConsoleStream: Read + Write + Send {
    /// Shut down both directions. Errors are ignored: the stream is
    /// dropped right after.
    fn shutdown(&mut self);
}

/// A bound, listening, non-blocking socket.
pub trait ConsoleListener: Send {
    type Stream: ConsoleStream;

    /// Accept one pending connection, or `Ok(None)` if there is none.
    ///
    /// Returned streams are already non-blocking with send coalescing
    /// disabled.
    fn try_accept(&self) -> io::Result<Option<(Self::Stream, SocketAddr)>>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Factory for listeners.
pub trait Transport: Send + Sync {
    type Stream: ConsoleStream;
    type Listener: ConsoleListener<Stream = Self::Stream>;

    /// Create, bind and listen on `addr`, in non-blocking mode.
    fn listen(&self, addr: SocketAddr) -> io::Result<Self::Listener>;
}

/// Returns `true` for errors that only mean "nothing to do right now".
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

// ── TCP ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    type Stream = TcpStream;
    type Listener = TcpListener;

    fn listen(&self, addr: SocketAddr) -> io::Result<TcpListener> {
        // std sets SO_REUSEADDR on Unix before binding.
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(listener)
    }
}

impl ConsoleListener for TcpListener {
    type Stream = TcpStream;

    fn try_accept(&self) -> io::Result<Option<(TcpStream, SocketAddr)>> {
        match self.accept() {
            Ok((stream, addr)) => {
                stream.set_nonblocking(true)?;
                stream.set_nodelay(true)?;
                Ok(Some((stream, addr)))
            }
            Err(e) if is_transient(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

impl ConsoleStream for TcpStream {
    fn shutdown(&mut self) {
        let _ = TcpStream::shutdown(self, Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_without_pending_connection_returns_none() {
        let listener = TcpTransport.listen("127.0.0.1:0".parse().unwrap()).unwrap();
        assert!(listener.try_accept().unwrap().is_none());
    }

    #[test]
    fn accepted_stream_is_non_blocking() {
        let listener = TcpTransport.listen("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = ConsoleListener::local_addr(&listener).unwrap();
        let _peer = TcpStream::connect(addr).unwrap();

        let mut accepted = None;
        for _ in 0..200 {
            if let Some(pair) = listener.try_accept().unwrap() {
                accepted = Some(pair);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let (mut stream, _) = accepted.expect("connection was not accepted");

        let mut buf = [0u8; 16];
        let err = stream.read(&mut buf).unwrap_err();
        assert!(is_transient(&err));
        assert!(stream.nodelay().unwrap());
    }
}
