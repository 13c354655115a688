//! Typed payloads for each VConsole packet type.
//!
//! Each sub-module defines the payload of one protocol exchange with
//! explicit field-by-field encoding, carried inside [`Packet`] bodies.
//!
//! [`Packet`]: crate::packet::Packet

pub mod command;
pub mod handshake;
pub mod print;

// Re-export the most commonly used types at the protocol level.
pub use command::CommandRequest;
pub use handshake::{
    AddOn, AppInfo, CONSOLE_CHANNEL_NAME, ChannelDescriptor, ChannelList, SERVER_NAME,
    handshake_packets,
};
pub use print::{COLOR_DEFAULT, COLOR_ERROR, DEFAULT_CHANNEL, PrintMessage};
