//! Human-readable rendering of received packets.

use vconsole_core::protocol::{AddOn, ChannelList};
use vconsole_core::{Packet, PacketType, PrintMessage};

const ANSI_RED: &str = "\x1b[31m";
const ANSI_RESET: &str = "\x1b[0m";

/// `true` when the RGB part of an RGBA colour is pure red.
pub fn is_red(color: u32) -> bool {
    let [r, g, b, _a] = color.to_be_bytes();
    r == 0xFF && g == 0 && b == 0
}

/// `[CH<n>] text`, red-highlighted if asked, always ending in a newline.
pub fn format_print(message: &PrintMessage, ansi: bool) -> String {
    let mut out = format!("  [CH{}] ", message.channel_id);
    if ansi && is_red(message.color) {
        out.push_str(ANSI_RED);
        out.push_str(&message.text);
        out.push_str(ANSI_RESET);
    } else {
        out.push_str(&message.text);
    }
    if !message.text.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Describe a packet the way the handshake log shows it: a headline
/// plus whatever its payload decodes to.
pub fn describe(packet: &Packet, ansi: bool) -> String {
    let mut out = format!(
        "Received: {} ({} bytes)\n",
        packet.packet_type(),
        packet.payload().len()
    );
    let payload = packet.payload();
    match packet.packet_type() {
        PacketType::Ainf => {
            out.push_str(&format!("  AINF payload size: {} bytes\n", payload.len()));
        }
        PacketType::Adon => match AddOn::from_bytes(payload) {
            Ok(add_on) => out.push_str(&format!("  Server name: {}\n", add_on.name)),
            Err(e) => out.push_str(&format!("  (bad ADON: {e})\n")),
        },
        PacketType::Chan => match ChannelList::from_bytes(payload) {
            Ok(list) => {
                out.push_str(&format!("  Number of channels: {}\n", list.channels.len()));
                for channel in &list.channels {
                    out.push_str(&format!("    Channel {}: {}\n", channel.id, channel.name));
                }
            }
            Err(e) => out.push_str(&format!("  (bad CHAN: {e})\n")),
        },
        PacketType::Prnt => match PrintMessage::from_bytes(payload) {
            Ok(message) => out.push_str(&format_print(&message, ansi)),
            Err(e) => out.push_str(&format!("  (bad PRNT: {e})\n")),
        },
        _ => {}
    }
    out
}
