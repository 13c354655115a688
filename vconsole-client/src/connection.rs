//! TCP connection to a VConsole server.
//!
//! Wraps the stream in the shared [`VConsoleCodec`] so the client sees
//! whole packets, however the bytes were split on the wire.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info};

use vconsole_core::{CommandRequest, Packet, VConsoleCodec};

/// Packets the server sends right after accepting.
pub const HANDSHAKE_PACKETS: usize = 3;

/// Outcome of waiting for the next packet.
#[derive(Debug)]
pub enum Received {
    Packet(Packet),
    TimedOut,
    Closed,
}

pub struct ConsoleConnection {
    framed: Framed<TcpStream, VConsoleCodec>,
    peer: SocketAddr,
}

impl ConsoleConnection {
    /// Connect to `addr` (`host:port`), giving up after `timeout`.
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self, Box<dyn std::error::Error>> {
        info!("connecting to {addr}");
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr)).await??;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        Ok(Self {
            framed: Framed::new(stream, VConsoleCodec),
            peer,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Wait for the next packet. `None` waits forever.
    pub async fn recv(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Received, Box<dyn std::error::Error>> {
        let next = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.framed.next()).await {
                Ok(next) => next,
                Err(_) => return Ok(Received::TimedOut),
            },
            None => self.framed.next().await,
        };
        match next {
            Some(packet) => {
                let packet = packet?;
                debug!(packet = ?packet, "received");
                Ok(Received::Packet(packet))
            }
            None => Ok(Received::Closed),
        }
    }

    /// Read the `AINF`, `ADON` and `CHAN` packets, in whatever form
    /// they arrive.
    pub async fn handshake(
        &mut self,
        timeout: Duration,
    ) -> Result<Vec<Packet>, Box<dyn std::error::Error>> {
        let mut packets = Vec::with_capacity(HANDSHAKE_PACKETS);
        while packets.len() < HANDSHAKE_PACKETS {
            match self.recv(Some(timeout)).await? {
                Received::Packet(packet) => packets.push(packet),
                Received::TimedOut => {
                    return Err(format!(
                        "timed out waiting for handshake packet {}",
                        packets.len() + 1
                    )
                    .into());
                }
                Received::Closed => return Err("connection closed during handshake".into()),
            }
        }
        Ok(packets)
    }

    /// Send one `CMND`.
    pub async fn send_command(&mut self, command: &str) -> Result<(), Box<dyn std::error::Error>> {
        let packet = CommandRequest::new(command).into_packet()?;
        self.framed.send(packet).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use vconsole_core::protocol::handshake_packets;
    use vconsole_core::{PacketType, PrintMessage};

    /// One-shot fake server: sends the handshake, answers the first
    /// command with a print, then hangs up.
    async fn fake_server() -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, VConsoleCodec);
            for packet in handshake_packets().unwrap() {
                framed.send(packet).await.unwrap();
            }
            let request = framed.next().await.unwrap().unwrap();
            let command = CommandRequest::from_packet(&request).unwrap().command;
            let reply = PrintMessage::new(format!("ok {command}\n")).into_packet().unwrap();
            framed.send(reply).await.unwrap();
            command
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn handshake_command_and_close() {
        let (addr, server) = fake_server().await;
        let mut conn = ConsoleConnection::connect(&addr, Duration::from_secs(5))
            .await
            .unwrap();

        let handshake = conn.handshake(Duration::from_secs(5)).await.unwrap();
        let types: Vec<_> = handshake.iter().map(Packet::packet_type).collect();
        assert_eq!(types, [PacketType::Ainf, PacketType::Adon, PacketType::Chan]);

        conn.send_command("status").await.unwrap();
        match conn.recv(Some(Duration::from_secs(5))).await.unwrap() {
            Received::Packet(packet) => {
                let print = PrintMessage::from_bytes(packet.payload()).unwrap();
                assert_eq!(print.text, "ok status\n");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(server.await.unwrap(), "status");

        assert!(matches!(
            conn.recv(Some(Duration::from_secs(5))).await.unwrap(),
            Received::Closed
        ));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let _accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let mut conn = ConsoleConnection::connect(&addr, Duration::from_secs(5))
            .await
            .unwrap();
        let err = conn.handshake(Duration::from_millis(50)).await.unwrap_err();
        assert!(err.to_string().contains("handshake packet 1"));
    }
}
