//! The embedded console server.
//!
//! [`VConsoleServer`] is driven entirely by the host: `initialize` once,
//! [`tick`](VConsoleServer::tick) every frame, `shutdown` on the way out.
//! It never spawns a thread and never blocks. Every method takes `&self`,
//! so a host can share the server behind an `Arc` and broadcast from
//! elsewhere while the frame loop keeps ticking.
//!
//! # Tick order
//!
//! 1. Drain captured stdout/stderr and broadcast it as `PRNT`.
//! 2. Accept at most one pending connection and send it the handshake.
//! 3. Read from every client and run the commands they sent.
//! 4. If clients went away, reopen the listener when below the limit.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::bridge::{HostConsole, Inbound, classify, execute_server_command};
use crate::capture::{LocalSink, OutputCapture, Redirect};
use crate::error::VConsoleError;
use crate::header::PROTOCOL_VERSION;
use crate::network::client::ClientInfo;
use crate::network::listener::{Acceptor, resolve_bind_addr};
use crate::network::registry::{ClientEvent, ClientRegistry, DisconnectReason};
use crate::network::transport::{TcpTransport, Transport};
use crate::packet::Packet;
use crate::protocol::handshake::handshake_packets;
use crate::protocol::print::{COLOR_DEFAULT, DEFAULT_CHANNEL, PrintMessage};

pub const DEFAULT_PORT: u16 = 29000;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_MAX_CONNECTIONS: usize = 1;

pub struct VConsoleServer<T: Transport = TcpTransport> {
    host: Box<dyn HostConsole>,
    acceptor: Mutex<Acceptor<T>>,
    clients: ClientRegistry<T::Stream>,
    capture: Mutex<OutputCapture>,
    sink: LocalSink,
    running: AtomicBool,
    port: AtomicU16,
    max_connections: AtomicUsize,
    logging: AtomicBool,
    capture_enabled: AtomicBool,
    /// Set whenever capacity may have changed outside the poll pass.
    recheck_admission: AtomicBool,
}

impl VConsoleServer<TcpTransport> {
    pub fn new(host: impl HostConsole + 'static) -> Self {
        Self::with_transport(host, TcpTransport)
    }
}

impl<T: Transport> VConsoleServer<T> {
    pub fn with_transport(host: impl HostConsole + 'static, transport: T) -> Self {
        let capture = OutputCapture::new();
        let sink = capture.sink();
        Self {
            host: Box::new(host),
            acceptor: Mutex::new(Acceptor::new(transport)),
            clients: ClientRegistry::new(),
            capture: Mutex::new(capture),
            sink,
            running: AtomicBool::new(false),
            port: AtomicU16::new(DEFAULT_PORT),
            max_connections: AtomicUsize::new(DEFAULT_MAX_CONNECTIONS),
            logging: AtomicBool::new(true),
            capture_enabled: AtomicBool::new(true),
            recheck_admission: AtomicBool::new(false),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Bind, listen and start capturing output.
    ///
    /// A running server is left untouched and `Ok` is returned. Capture
    /// is best effort: if it cannot be set up the server runs without it.
    pub fn initialize(&self, port: u16, bind: &str) -> Result<(), VConsoleError> {
        if self.is_running() {
            return Ok(());
        }
        let addr = resolve_bind_addr(bind, port)?;

        let bound = {
            let mut acceptor = self.lock_acceptor();
            acceptor.configure(addr);
            if let Err(e) = acceptor.start() {
                warn!(%addr, error = %e, "VConsole server failed to listen");
                return Err(e);
            }
            // Later restarts must come back on the same port, even when
            // the caller asked for an ephemeral one.
            let bound = acceptor.local_addr().unwrap_or(addr);
            acceptor.configure(bound);
            bound
        };

        self.port.store(bound.port(), Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);

        if self.capture_enabled.load(Ordering::SeqCst) {
            if let Err(e) = self.lock_capture().setup() {
                warn!(error = %e, "output capture unavailable, local logs go to the host console");
            }
        }

        info!(addr = %bound, "VConsole server listening");
        Ok(())
    }

    /// Close every client and the listener, and restore stdout/stderr.
    /// Safe to call at any time, any number of times.
    pub fn shutdown(&self) {
        self.lock_capture().cleanup();
        let was_running = self.running.swap(false, Ordering::SeqCst);
        let closed = self.clients.close_all();
        self.lock_acceptor().stop();
        if was_running {
            info!(clients = closed.len(), "VConsole server stopped");
        }
    }

    /// Decide whether `initialize` redirects the process's stdout and
    /// stderr. On by default.
    pub fn set_capture_enabled(&self, enabled: bool) {
        self.capture_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Capture through caller-provided redirects instead of the process's
    /// standard streams.
    pub fn install_capture(&self, stdout: Box<dyn Redirect>, stderr: Box<dyn Redirect>) {
        self.lock_capture().install(stdout, stderr);
    }

    // ── Tick ─────────────────────────────────────────────────────

    /// One frame's worth of work. A no-op unless running.
    pub fn tick(&self) {
        if !self.is_running() {
            return;
        }
        self.relay_captured_output();
        self.accept_pending();
        self.process_clients();
        self.enforce_admission();
    }

    fn relay_captured_output(&self) {
        let lines = self.lock_capture().drain();
        for line in lines {
            self.send_to_all(line);
        }
    }

    fn accept_pending(&self) {
        let accepted = self.lock_acceptor().try_accept();
        let (stream, addr) = match accepted {
            Ok(Some(pending)) => pending,
            Ok(None) => return,
            Err(e) => {
                if self.logging_enabled() {
                    debug!(error = %e, "accept failed");
                }
                return;
            }
        };

        let greeting = match handshake_packets() {
            Ok(packets) => packets,
            Err(e) => {
                warn!(error = %e, "could not build handshake, dropping connection");
                return;
            }
        };

        match self.clients.admit(stream, addr, &greeting) {
            Ok((client, count)) => {
                let max = self.max_connections();
                if max > 0 && count >= max {
                    self.lock_acceptor().stop();
                    if self.logging_enabled() {
                        debug!(max, "connection limit reached, listener closed");
                    }
                }
                self.log_local(&format!("[VConsole] Client connected: {client}\n"));
            }
            Err((client, e)) => {
                self.log_local(&format!("[VConsole] Client connected: {client}\n"));
                self.log_disconnect(client, &DisconnectReason::Broken(e));
                self.recheck_admission.store(true, Ordering::SeqCst);
            }
        }
    }

    fn process_clients(&self) {
        // Events are handled with the client lock released, so a host
        // command that broadcasts does not deadlock.
        for event in self.clients.poll() {
            match event {
                ClientEvent::Packet(client, packet) => self.handle_packet(client, &packet),
                ClientEvent::Malformed { client, error } => {
                    if self.logging_enabled() {
                        debug!(%client, %error, "discarded unframeable input");
                    }
                }
                ClientEvent::Disconnected(client, reason) => {
                    self.log_disconnect(client, &reason);
                    self.recheck_admission.store(true, Ordering::SeqCst);
                }
            }
        }
    }

    fn handle_packet(&self, client: ClientInfo, packet: &Packet) {
        if self.logging_enabled() && packet.header().version() != PROTOCOL_VERSION {
            debug!(%client, version = packet.header().version(), "unexpected protocol version");
        }
        match classify(packet) {
            Inbound::Command(command) => {
                self.log_local(&format!("[VConsole] Command from {client}: {command}\n"));
                execute_server_command(self.host.as_ref(), &command);
            }
            Inbound::EmptyCommand => {}
            Inbound::Ignored { packet_type, dump } => {
                if packet_type.is_server_to_client() && self.logging_enabled() {
                    debug!(%client, %packet_type, "client sent a server-only packet");
                }
                self.log_local(&format!(
                    "[VConsole] Unknown packet type '{packet_type}', hex dump: {dump}\n"
                ));
            }
        }
    }

    /// Close the listener while full, reopen it once there is room.
    fn enforce_admission(&self) {
        if !self.recheck_admission.swap(false, Ordering::SeqCst) {
            return;
        }
        let max = self.max_connections();
        let full = max > 0 && self.clients.len() >= max;

        let mut acceptor = self.lock_acceptor();
        if full {
            acceptor.stop();
            return;
        }
        if acceptor.is_listening() {
            return;
        }
        match acceptor.start() {
            Ok(()) => {
                if self.logging_enabled() {
                    debug!("listener reopened");
                }
            }
            Err(e) => warn!(error = %e, "failed to reopen VConsole listener"),
        }
    }

    // ── Output ───────────────────────────────────────────────────

    /// Send a line of text to every client at the default colour.
    pub fn broadcast(&self, text: &str) {
        self.broadcast_print(text, DEFAULT_CHANNEL, COLOR_DEFAULT);
    }

    /// Send a `PRNT` to every client. Ignored when not running or when
    /// `text` is empty.
    pub fn broadcast_print(&self, text: &str, channel: i32, color: u32) {
        if !self.is_running() || text.is_empty() {
            return;
        }
        self.send_to_all(
            PrintMessage::new(text)
                .with_channel(channel)
                .with_color(color),
        );
    }

    /// Text longer than one `PRNT` goes out as several.
    fn send_to_all(&self, message: PrintMessage) {
        for chunk in message.into_chunks() {
            let packet = match chunk.into_packet() {
                Ok(packet) => packet,
                Err(e) => {
                    debug!(error = %e, "unencodable print message");
                    return;
                }
            };
            let dropped = self.clients.broadcast(&packet);
            if !dropped.is_empty() {
                self.recheck_admission.store(true, Ordering::SeqCst);
            }
            for (client, reason) in dropped {
                self.log_disconnect(client, &reason);
            }
        }
    }

    /// Write a line for whoever watches the host's own console.
    ///
    /// While capture is active the line goes straight to the preserved
    /// stdout, so it is not relayed to clients. Otherwise the host's
    /// print facility is used. Nothing happens with logging disabled.
    pub fn log_local(&self, message: &str) {
        if !self.logging_enabled() {
            return;
        }
        if !matches!(self.sink.write_preserved(message.as_bytes()), Ok(true)) {
            self.host.server_print(message);
        }
    }

    fn log_disconnect(&self, client: ClientInfo, reason: &DisconnectReason) {
        if self.logging_enabled() {
            debug!(%client, id = %client.id, %reason, "client removed");
        }
        self.log_local(&format!("[VConsole] Client disconnected: {client}\n"));
    }

    // ── Administration ───────────────────────────────────────────

    /// Maximum simultaneous clients, `0` for no limit. Applied on the
    /// next tick.
    pub fn set_max_connections(&self, max: usize) {
        self.max_connections.store(max, Ordering::SeqCst);
        self.recheck_admission.store(true, Ordering::SeqCst);
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections.load(Ordering::SeqCst)
    }

    pub fn set_logging(&self, enabled: bool) {
        self.logging.store(enabled, Ordering::SeqCst);
    }

    pub fn logging_enabled(&self) -> bool {
        self.logging.load(Ordering::SeqCst)
    }

    /// Port currently (or last) bound.
    pub fn port(&self) -> u16 {
        self.port.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn clients(&self) -> Vec<ClientInfo> {
        self.clients.clients()
    }

    /// Address the listener is bound to, while it is open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock_acceptor().local_addr()
    }

    pub fn is_listening(&self) -> bool {
        self.lock_acceptor().is_listening()
    }

    /// Handle for writing local output that bypasses capture.
    pub fn local_sink(&self) -> LocalSink {
        self.sink.clone()
    }

    fn lock_acceptor(&self) -> MutexGuard<'_, Acceptor<T>> {
        self.acceptor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_capture(&self) -> MutexGuard<'_, OutputCapture> {
        self.capture.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Transport> Drop for VConsoleServer<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::tests::RecordingHost;
    use crate::capture::mock::Script;
    use crate::message::PacketType;
    use crate::network::mock::{MockPeer, MockTransport};
    use crate::protocol::command::CommandRequest;
    use crate::protocol::print::COLOR_ERROR;
    use std::sync::Arc;

    const PORT: u16 = 29000;

    fn server() -> (Arc<RecordingHost>, MockTransport, VConsoleServer<MockTransport>) {
        let host = Arc::new(RecordingHost::default());
        let transport = MockTransport::default();
        let server = VConsoleServer::with_transport(Arc::clone(&host), transport.clone());
        server.set_capture_enabled(false);
        (host, transport, server)
    }

    fn running() -> (Arc<RecordingHost>, MockTransport, VConsoleServer<MockTransport>) {
        let (host, transport, server) = server();
        server.initialize(PORT, "127.0.0.1").unwrap();
        (host, transport, server)
    }

    /// Connect and tick until the server has accepted.
    fn attach(transport: &MockTransport, server: &VConsoleServer<MockTransport>) -> MockPeer {
        let peer = transport.connect(PORT).expect("listener should be open");
        server.tick();
        peer
    }

    fn prints(peer: &MockPeer) -> Vec<PrintMessage> {
        peer.received()
            .into_iter()
            .filter(|p| p.packet_type() == PacketType::Prnt)
            .map(|p| PrintMessage::from_bytes(p.payload()).unwrap())
            .collect()
    }

    #[test]
    fn handshake_is_sent_on_accept() {
        let (_host, transport, server) = running();
        let peer = attach(&transport, &server);

        let types: Vec<_> = peer.received().iter().map(Packet::packet_type).collect();
        assert_eq!(types, [PacketType::Ainf, PacketType::Adon, PacketType::Chan]);
        assert_eq!(server.client_count(), 1);
    }

    #[test]
    fn command_runs_exactly_once() {
        let (host, transport, server) = running();
        let peer = attach(&transport, &server);

        peer.send_packet(&CommandRequest::new("status").into_packet().unwrap());
        server.tick();
        server.tick();

        assert_eq!(host.commands(), ["status\n"]);
        assert_eq!(host.calls().iter().filter(|c| *c == "execute").count(), 1);
        assert!(
            host.prints()
                .contains(&"[VConsole] Command from 10.0.0.1:29000: status\n".to_string())
        );
    }

    #[test]
    fn several_commands_in_one_read() {
        let (host, transport, server) = running();
        let peer = attach(&transport, &server);

        let mut bytes = CommandRequest::new("a").into_packet().unwrap().to_bytes().to_vec();
        bytes.extend_from_slice(&CommandRequest::new("b").into_packet().unwrap().to_bytes());
        peer.send(&bytes);
        server.tick();

        assert_eq!(host.commands(), ["a\n", "b\n"]);
    }

    #[test]
    fn unknown_packets_keep_client_connected() {
        let (host, transport, server) = running();
        let peer = attach(&transport, &server);

        for len in [0, 1, 64, 4096 - crate::header::HEADER_SIZE] {
            let packet = Packet::new(PacketType::from(*b"XXXX"), vec![0x41; len]).unwrap();
            peer.send_packet(&packet);
            server.tick();
            server.tick();
        }

        assert_eq!(server.client_count(), 1);
        assert!(host.commands().is_empty());
        let unknown = host
            .prints()
            .iter()
            .filter(|p| p.starts_with("[VConsole] Unknown packet type 'XXXX', hex dump: 58 58 58 58"))
            .count();
        assert_eq!(unknown, 4);
    }

    #[test]
    fn malformed_header_keeps_client_connected() {
        let (host, transport, server) = running();
        let peer = attach(&transport, &server);

        peer.send(b"CMND\0\0\0\xd4\0\x02\0\0");
        server.tick();
        peer.send_packet(&CommandRequest::new("after").into_packet().unwrap());
        server.tick();

        assert_eq!(server.client_count(), 1);
        assert_eq!(host.commands(), ["after\n"]);
    }

    #[test]
    fn truncated_command_does_not_block_the_next_one() {
        let (host, transport, server) = running();
        let peer = attach(&transport, &server);

        let mut bytes = b"CMND\0\0\0\xd4\0\xc8\0\0bad\0".to_vec();
        bytes.extend_from_slice(&CommandRequest::new("status").into_packet().unwrap().to_bytes());
        peer.send(&bytes);
        for _ in 0..5 {
            server.tick();
        }

        assert_eq!(host.commands(), ["status\n"]);
        assert_eq!(server.client_count(), 1);
    }

    #[test]
    fn listener_closes_at_limit_and_reopens() {
        let (_host, transport, server) = running();
        server.set_max_connections(2);

        let first = attach(&transport, &server);
        let _second = attach(&transport, &server);
        assert_eq!(server.client_count(), 2);
        assert!(!transport.is_listening());
        assert!(transport.connect(PORT).is_none());

        first.close();
        server.tick();
        assert_eq!(server.client_count(), 1);
        assert!(transport.is_listening());

        let _third = attach(&transport, &server);
        assert_eq!(server.client_count(), 2);
        assert!(!transport.is_listening());
    }

    #[test]
    fn default_limit_is_one_client() {
        let (_host, transport, server) = running();
        let _only = attach(&transport, &server);
        assert!(!server.is_listening());
        assert!(transport.connect(PORT).is_none());
    }

    #[test]
    fn zero_means_unlimited() {
        let (_host, transport, server) = running();
        server.set_max_connections(0);
        let _peers: Vec<_> = (0..5).map(|_| attach(&transport, &server)).collect();
        assert_eq!(server.client_count(), 5);
        assert!(transport.is_listening());
    }

    #[test]
    fn raising_the_limit_reopens_listener() {
        let (_host, transport, server) = running();
        let _only = attach(&transport, &server);
        assert!(!transport.is_listening());

        server.set_max_connections(3);
        server.tick();
        assert!(transport.is_listening());
    }

    #[test]
    fn broken_client_is_pruned_others_unaffected() {
        let (_host, transport, server) = running();
        server.set_max_connections(0);
        let healthy = attach(&transport, &server);
        let broken = attach(&transport, &server);
        healthy.received();

        broken.break_connection();
        server.tick();
        assert_eq!(server.client_count(), 1);

        server.broadcast("still here\n");
        assert_eq!(prints(&healthy)[0].text, "still here\n");
    }

    #[test]
    fn broadcast_reaches_every_client() {
        let (_host, transport, server) = running();
        server.set_max_connections(0);
        let a = attach(&transport, &server);
        let b = attach(&transport, &server);

        server.broadcast("hi\n");
        server.broadcast("");
        server.broadcast_print("alert\n", 0, COLOR_ERROR);

        for peer in [a, b] {
            let got = prints(&peer);
            assert_eq!(got.len(), 2);
            assert_eq!(got[0], PrintMessage::new("hi\n"));
            assert!(got[1].is_error());
        }
    }

    #[test]
    fn long_broadcast_arrives_in_several_prints() {
        let (_host, transport, server) = running();
        let peer = attach(&transport, &server);

        let text = format!("{}\n", "y".repeat(100_000));
        server.broadcast(&text);

        let got = prints(&peer);
        assert_eq!(got.len(), 2);
        let joined: String = got.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn captured_output_is_relayed() {
        let (host, transport, server) = running();
        let (stdout, stderr) = (Script::default(), Script::default());
        server.install_capture(stdout.redirect(), stderr.redirect());
        let peer = attach(&transport, &server);

        stdout.push(b"hello ");
        server.tick();
        stdout.push(b"world\n");
        stderr.push(b"bad\n");
        server.tick();

        let got = prints(&peer);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].text, "hello world\n");
        assert!(!got[0].is_error());
        assert_eq!(got[1].text, "bad\n");
        assert!(got[1].is_error());

        // Local log lines bypass capture while it is active.
        let echoed = String::from_utf8(stdout.echoed()).unwrap();
        assert!(echoed.contains("[VConsole] Client connected: 10.0.0.1:29000\n"));
        assert!(host.prints().is_empty());
    }

    #[test]
    fn logging_can_be_silenced() {
        let (host, transport, server) = running();
        server.set_logging(false);
        let peer = attach(&transport, &server);
        peer.send_packet(&CommandRequest::new("quiet").into_packet().unwrap());
        server.tick();

        assert!(host.prints().is_empty());
        assert_eq!(host.commands(), ["quiet\n"]);
    }

    #[test]
    fn tick_is_a_noop_until_initialized() {
        let (host, transport, server) = server();
        server.tick();
        server.broadcast("nobody\n");
        assert!(!transport.is_listening());
        assert!(host.calls().is_empty());
    }

    #[test]
    fn shutdown_closes_everything_and_is_idempotent() {
        let (_host, transport, server) = running();
        let peer = attach(&transport, &server);

        server.shutdown();
        server.shutdown();
        assert!(!server.is_running());
        assert!(!transport.is_listening());
        assert!(peer.was_shut_down());
        assert_eq!(server.client_count(), 0);

        server.tick();
        assert!(transport.connect(PORT).is_none());
    }

    #[test]
    fn initialize_is_noop_while_running_and_works_after_shutdown() {
        let (_host, transport, server) = running();
        server.initialize(PORT, "127.0.0.1").unwrap();
        assert_eq!(transport.listen_count(), 1);

        server.shutdown();
        server.initialize(PORT, "127.0.0.1").unwrap();
        assert!(server.is_running());
        assert_eq!(server.port(), PORT);
        let _peer = attach(&transport, &server);
        assert_eq!(server.client_count(), 1);
    }

    #[test]
    fn bind_failure_is_reported() {
        let (_host, transport, server) = server();
        transport.refuse_listen(true);
        assert!(matches!(
            server.initialize(PORT, "127.0.0.1"),
            Err(VConsoleError::Bind { .. })
        ));
        assert!(!server.is_running());
    }
}
