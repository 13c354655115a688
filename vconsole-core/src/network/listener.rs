//! The listening side of the server.
//!
//! The acceptor owns at most one listening socket. Admission control
//! closes it outright while the server is full, so a full server stops
//! advertising itself instead of rejecting clients after the handshake.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};

use crate::error::VConsoleError;
use crate::network::transport::{ConsoleListener, Transport};

pub struct Acceptor<T: Transport> {
    transport: T,
    addr: Option<SocketAddr>,
    listener: Option<T::Listener>,
}

impl<T: Transport> Acceptor<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            addr: None,
            listener: None,
        }
    }

    /// Set the address later `start` calls bind to. Takes effect on the
    /// next start; a socket that is already open is left alone.
    pub fn configure(&mut self, addr: SocketAddr) {
        self.addr = Some(addr);
    }

    /// Open the listening socket. A no-op while already listening.
    ///
    /// Nothing is retried here: on failure the acceptor stays stopped
    /// and the caller decides what to do.
    pub fn start(&mut self) -> Result<(), VConsoleError> {
        if self.listener.is_some() {
            return Ok(());
        }
        let addr = self
            .addr
            .ok_or(VConsoleError::ProtocolViolation("listener has no address"))?;
        let listener = self
            .transport
            .listen(addr)
            .map_err(|e| VConsoleError::bind(addr, e))?;
        self.listener = Some(listener);
        Ok(())
    }

    /// Close the listening socket. A no-op when already stopped.
    pub fn stop(&mut self) {
        self.listener = None;
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    /// Accept one pending connection if listening.
    pub fn try_accept(&self) -> io::Result<Option<(T::Stream, SocketAddr)>> {
        match &self.listener {
            Some(listener) => listener.try_accept(),
            None => Ok(None),
        }
    }

    /// Address actually bound, if listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }
}

/// Turn a configured bind address and port into a socket address.
///
/// An empty string or `0.0.0.0` means every IPv4 interface. IP literals
/// are used as-is; anything else goes through the system resolver and
/// the first result wins.
pub fn resolve_bind_addr(bind: &str, port: u16) -> Result<SocketAddr, VConsoleError> {
    let bind = bind.trim();
    if bind.is_empty() {
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }
    if let Ok(ip) = bind.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    (bind, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| VConsoleError::InvalidBindAddress(bind.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::transport::TcpTransport;

    #[test]
    fn wildcard_and_empty_bind_all_interfaces() {
        let any = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 29000);
        assert_eq!(resolve_bind_addr("", 29000).unwrap(), any);
        assert_eq!(resolve_bind_addr("0.0.0.0", 29000).unwrap(), any);
    }

    #[test]
    fn literal_addresses() {
        assert_eq!(
            resolve_bind_addr("127.0.0.1", 1234).unwrap(),
            "127.0.0.1:1234".parse().unwrap()
        );
        assert_eq!(
            resolve_bind_addr("::1", 1234).unwrap(),
            "[::1]:1234".parse().unwrap()
        );
    }

    #[test]
    fn garbage_address_is_rejected() {
        assert!(matches!(
            resolve_bind_addr("not an address!", 1),
            Err(VConsoleError::InvalidBindAddress(_))
        ));
    }

    #[test]
    fn start_stop_are_idempotent() {
        let mut acceptor = Acceptor::new(TcpTransport);
        assert!(acceptor.start().is_err());

        acceptor.configure("127.0.0.1:0".parse().unwrap());
        acceptor.start().unwrap();
        let addr = acceptor.local_addr().unwrap();
        acceptor.start().unwrap();
        assert_eq!(acceptor.local_addr(), Some(addr));

        acceptor.stop();
        acceptor.stop();
        assert!(!acceptor.is_listening());
        assert!(acceptor.try_accept().unwrap().is_none());
    }

    #[test]
    fn bind_conflict_reports_failure() {
        let mut first = Acceptor::new(TcpTransport);
        first.configure("127.0.0.1:0".parse().unwrap());
        first.start().unwrap();
        let taken = first.local_addr().unwrap();

        let mut second = Acceptor::new(TcpTransport);
        second.configure(taken);
        assert!(matches!(second.start(), Err(VConsoleError::Bind { .. })));
        assert!(!second.is_listening());
    }
}
