//! Configuration for the console host.
//!
//! The console settings may sit at the top level of the file or in a
//! `[vconsole]` table; keys in the table win. Host-only settings live in
//! `[host]`.
//!
//! ```toml
//! [vconsole]
//! port = 29000
//! bind = "127.0.0.1"
//! max_connections = 1   # 0 = unlimited
//! logging = true
//!
//! [host]
//! tick_rate_hz = 60
//! log_level = "info"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use vconsole_core::{DEFAULT_BIND, DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT};

/// Everything the host reads from its config file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostConfig {
    #[serde(rename = "vconsole")]
    pub console: ConsoleSettings,
    pub host: HostSettings,
}

/// Settings handed to the console server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsoleSettings {
    pub port: u16,
    /// Empty or `0.0.0.0` listens on every interface.
    pub bind: String,
    /// `0` means no limit.
    pub max_connections: usize,
    pub logging: bool,
    /// Redirect stdout/stderr to clients.
    pub capture_output: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    /// Server ticks per second.
    pub tick_rate_hz: u32,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            console: ConsoleSettings::default(),
            host: HostSettings::default(),
        }
    }
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            logging: true,
            capture_output: true,
        }
    }
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60,
            log_level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl HostConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml(&contents).unwrap_or_else(|e| {
                warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Parse a config file. Values of the wrong type or out of range are
    /// reported and skipped; only unparseable TOML is an error.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        let table: toml::Table = text.parse()?;
        let mut config = Self::default();

        config.console.apply(&table);
        if let Some(section) = table.get("vconsole").and_then(toml::Value::as_table) {
            config.console.apply(section);
        }
        if let Some(host) = table.get("host") {
            config.host = host.clone().try_into()?;
        }
        if config.host.tick_rate_hz == 0 {
            warn!("tick_rate_hz must be positive; using 1");
            config.host.tick_rate_hz = 1;
        }
        Ok(config)
    }

    /// The defaults as a TOML document, for `--gen-config`.
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&Self::default())
    }
}

impl ConsoleSettings {
    fn apply(&mut self, table: &toml::Table) {
        if let Some(value) = table.get("port") {
            match value.as_integer().and_then(|p| u16::try_from(p).ok()).filter(|&p| p != 0) {
                Some(port) => self.port = port,
                None => warn!("port must be 1-65535, got {value}; keeping {}", self.port),
            }
        }
        if let Some(value) = table.get("bind") {
            match value.as_str() {
                Some(bind) => self.bind = bind.trim().to_string(),
                None => warn!("bind must be a string, got {value}"),
            }
        }
        if let Some(value) = table.get("max_connections") {
            match value.as_integer() {
                Some(max) => self.max_connections = usize::try_from(max).unwrap_or(0),
                None => warn!("max_connections must be an integer, got {value}"),
            }
        }
        if let Some(value) = table.get("logging") {
            match flag(value) {
                Some(on) => self.logging = on,
                None => warn!("logging must be a boolean, got {value}"),
            }
        }
        if let Some(value) = table.get("capture_output") {
            match flag(value) {
                Some(on) => self.capture_output = on,
                None => warn!("capture_output must be a boolean, got {value}"),
            }
        }
    }
}

/// `true`/`false`, or an integer where non-zero means on.
fn flag(value: &toml::Value) -> Option<bool> {
    value
        .as_bool()
        .or_else(|| value.as_integer().map(|n| n != 0))
}

// ── Tests ────────────────────────────────────────────────────────
