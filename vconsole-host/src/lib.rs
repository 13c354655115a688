//! # vconsole-host — Console Host
//!
//! A small stand-in for a game server: it embeds the VConsole server,
//! ticks it once per frame, and executes the commands clients send.
//! Everything the host prints on stdout/stderr is relayed to attached
//! clients.
//!
//! ## Built-in commands
//!
//! `echo`, `say`, `status`, `version`, `help`, `quit`. Commands can be
//! typed on the host's own stdin as well.

pub mod config;
pub mod service;
