//! Inbound packets to host commands.

use std::sync::Arc;

use crate::message::PacketType;
use crate::packet::Packet;
use crate::protocol::command::CommandRequest;

/// Bytes of an ignored packet shown in its log line.
pub const HEX_DUMP_LIMIT: usize = 64;

/// What the embedding host provides to the console server.
///
/// Calls are made from whatever thread drives `tick()`, never while the
/// server holds one of its own locks, so implementations may call back
/// into the server.
pub trait HostConsole: Send + Sync {
    /// Queue one command line (already newline-terminated).
    fn server_command(&self, command: &str);

    /// Run everything queued by [`server_command`](Self::server_command).
    fn server_execute(&self);

    /// Print a line on the host's own console.
    fn server_print(&self, text: &str);
}

impl<H: HostConsole + ?Sized> HostConsole for Arc<H> {
    fn server_command(&self, command: &str) {
        (**self).server_command(command)
    }

    fn server_execute(&self) {
        (**self).server_execute()
    }

    fn server_print(&self, text: &str) {
        (**self).server_print(text)
    }
}

/// Submit `command` to the host and run it right away.
///
/// Empty commands are dropped. A trailing newline is added if missing.
pub fn execute_server_command(host: &dyn HostConsole, command: &str) {
    if command.is_empty() {
        return;
    }
    if command.ends_with('\n') {
        host.server_command(command);
    } else {
        host.server_command(&format!("{command}\n"));
    }
    host.server_execute();
}

/// How the server should react to a packet from a client.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    /// A command to run.
    Command(String),
    /// A `CMND` with no text.
    EmptyCommand,
    /// Anything else. Carries a hex dump for the log.
    Ignored { packet_type: PacketType, dump: String },
}

pub fn classify(packet: &Packet) -> Inbound {
    match CommandRequest::from_packet(packet) {
        Ok(request) if request.is_empty() => Inbound::EmptyCommand,
        Ok(request) => Inbound::Command(request.command),
        Err(_) => Inbound::Ignored {
            packet_type: packet.packet_type(),
            dump: hex_dump(&packet.to_bytes()),
        },
    }
}

/// Space-separated upper-case hex of at most [`HEX_DUMP_LIMIT`] bytes,
/// with `...` appended when `bytes` is longer.
pub fn hex_dump(bytes: &[u8]) -> String {
    let shown = &bytes[..bytes.len().min(HEX_DUMP_LIMIT)];
    let mut out = shown
        .iter()
        .map(|b| hex::encode_upper([*b]))
        .collect::<Vec<_>>()
        .join(" ");
    if bytes.len() > HEX_DUMP_LIMIT {
        out.push_str(" ...");
    }
    out
}
