//! VConsole host — entry point.
//!
//! ```text
//! vconsole-host                      Run with vconsole.toml (or defaults)
//! vconsole-host --config <path>      Load a custom config TOML
//! vconsole-host --port 27015         Override the console port
//! vconsole-host --bind 0.0.0.0       Override the bind address
//! vconsole-host --gen-config         Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vconsole_host::config::HostConfig;
use vconsole_host::service::{HostService, stdin_lines};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vconsole-host", about = "Host process serving a VConsole remote console")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "vconsole.toml")]
    config: PathBuf,

    /// Console port (overrides the config file).
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// Bind address (overrides the config file).
    #[arg(short, long)]
    bind: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        println!("{}", HostConfig::default_toml()?);
        return Ok(());
    }

    // Load config.
    let mut config = HostConfig::load(&cli.config);
    if let Some(port) = cli.port {
        config.console.port = port;
    }
    if let Some(bind) = cli.bind {
        config.console.bind = bind;
    }

    let service = HostService::new(config.clone());

    // Init tracing. Log lines go to the real terminal even while stdout
    // is being captured for clients.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.host.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(service.server().local_sink().writer())
        .init();

    info!("vconsole-host v{}", env!("CARGO_PKG_VERSION"));
    info!("console: {}:{}", config.console.bind, config.console.port);
    info!("max connections: {}", config.console.max_connections);
    info!("tick rate: {} Hz", config.host.tick_rate_hz);

    service.attach()?;
    info!("listening on port {}", service.server().port());

    // Ctrl-C handler.
    let stop = service.stop_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, Ordering::SeqCst);
    });

    service.run(stdin_lines()).await?;

    Ok(())
}
