//! # vconsole-client — VConsole Test Client
//!
//! Connects to a VConsole server, prints the handshake it receives,
//! sends commands and shows the console output that comes back.
//! Standard-error lines (red) are highlighted on ANSI terminals.

pub mod connection;
pub mod display;
