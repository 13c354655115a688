//! VConsole client — entry point.
//!
//! ```text
//! vconsole-client                        Connect, handshake, send `status`
//! vconsole-client -H 10.0.0.5 -p 27015   Connect elsewhere
//! vconsole-client -c "echo hi" -c status Send several commands
//! vconsole-client -l                     Keep printing output until Ctrl-C
//! ```

use std::io::IsTerminal;
use std::time::Duration;

use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use vconsole_client::connection::{ConsoleConnection, Received};
use vconsole_client::display::describe;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "vconsole-client",
    about = "VConsole test client",
    disable_help_flag = true
)]
struct Cli {
    /// Server IP or host name.
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port.
    #[arg(short, long, default_value_t = 29000)]
    port: u16,

    /// Command to send (repeatable).
    #[arg(short, long = "cmd")]
    cmd: Vec<String>,

    /// Read timeout in milliseconds.
    #[arg(short, long, default_value_t = 5000)]
    timeout: u64,

    /// Keep listening for messages after the commands.
    #[arg(short, long)]
    listen: bool,

    /// Never emit ANSI colour codes.
    #[arg(long)]
    no_color: bool,

    /// Show this help.
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let ansi = !cli.no_color && std::io::stdout().is_terminal();
    let timeout = Duration::from_millis(cli.timeout);
    let addr = format!("{}:{}", cli.host, cli.port);

    println!("=== VConsole Test Client ===");
    println!("Connecting to {addr}...");
    let mut conn = ConsoleConnection::connect(&addr, timeout).await?;
    println!("Connected to {}", conn.peer_addr());

    // ── 1. Handshake ────────────────────────────────────────────

    println!("\n=== Receiving Handshake ===");
    for packet in conn.handshake(timeout).await? {
        print!("{}", describe(&packet, ansi));
    }
    println!("\n=== Handshake Complete ===");

    // ── 2. Commands ─────────────────────────────────────────────

    let mut commands = cli.cmd;
    if commands.is_empty() && !cli.listen {
        commands.push("status".into());
    }

    for command in &commands {
        println!("\n=== Sending Command: {command} ===");
        conn.send_command(command).await?;

        println!("\n=== Waiting for Response ===");
        loop {
            match conn.recv(Some(timeout)).await? {
                Received::Packet(packet) => print!("{}", describe(&packet, ansi)),
                Received::TimedOut => {
                    eprintln!("Timeout waiting for data");
                    break;
                }
                Received::Closed => {
                    eprintln!("Connection closed by server");
                    return Ok(());
                }
            }
            if !cli.listen {
                break;
            }
        }
    }

    // ── 3. Listen ───────────────────────────────────────────────

    if cli.listen {
        println!("\n=== Listening for Messages (Ctrl+C to exit) ===");
        loop {
            let received = tokio::select! {
                received = conn.recv(None) => received?,
                _ = tokio::signal::ctrl_c() => break,
            };
            match received {
                Received::Packet(packet) => print!("{}", describe(&packet, ansi)),
                Received::TimedOut => {}
                Received::Closed => {
                    eprintln!("Connection closed by server");
                    break;
                }
            }
        }
    }

    println!("\n=== Test Complete ===");
    Ok(())
}
