//! The host process around the console server.
//!
//! Plays the part of the engine: owns the server, ticks it once per
//! frame, reads commands typed on stdin and executes everything the
//! server relays through a small built-in command set.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use vconsole_core::{HostConsole, VConsoleError, VConsoleServer, execute_server_command};

use crate::config::HostConfig;

// ── ConsoleHost ──────────────────────────────────────────────────

/// Command executor and print facility handed to the server.
///
/// Command output goes to stdout and errors to stderr, which is exactly
/// what the server captures and relays to clients.
#[derive(Default)]
pub struct ConsoleHost {
    server: OnceLock<Weak<VConsoleServer>>,
    queue: Mutex<VecDeque<String>>,
    running: Arc<AtomicBool>,
}

impl ConsoleHost {
    pub fn new(running: Arc<AtomicBool>) -> Self {
        Self {
            running,
            ..Self::default()
        }
    }

    /// Give the host a way back to the server, for `status` and `say`.
    pub fn attach(&self, server: &Arc<VConsoleServer>) {
        let _ = self.server.set(Arc::downgrade(server));
    }

    fn server(&self) -> Option<Arc<VConsoleServer>> {
        self.server.get().and_then(Weak::upgrade)
    }

    fn run_command(&self, line: &str) {
        let line = line.trim();
        let (name, args) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let args = args.trim();
        match name {
            "" => {}
            "echo" => println!("{args}"),
            "version" => println!("vconsole-host {}", env!("CARGO_PKG_VERSION")),
            "status" => self.print_status(),
            "say" => match self.server() {
                Some(server) => server.broadcast(&format!("[host] {args}\n")),
                None => eprintln!("say: server not attached"),
            },
            "help" => println!("commands: echo <text>, say <text>, status, version, help, quit"),
            "quit" | "exit" => {
                println!("shutting down");
                self.running.store(false, Ordering::SeqCst);
            }
            other => eprintln!("Unknown command \"{other}\""),
        }
    }

    fn print_status(&self) {
        let Some(server) = self.server() else {
            println!("status: server not attached");
            return;
        };
        println!(
            "vconsole: {} on port {}, {} client(s), limit {}",
            if server.is_running() { "running" } else { "stopped" },
            server.port(),
            server.client_count(),
            match server.max_connections() {
                0 => "none".to_string(),
                n => n.to_string(),
            }
        );
        for client in server.clients() {
            println!("  {} {}", client.id, client);
        }
    }
}

impl HostConsole for ConsoleHost {
    fn server_command(&self, command: &str) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(command.to_string());
    }

    fn server_execute(&self) {
        loop {
            // Pop one at a time so a command may queue further commands.
            let next = self.queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
            match next {
                Some(command) => self.run_command(&command),
                None => break,
            }
        }
    }

    fn server_print(&self, text: &str) {
        print!("{text}");
    }
}

// ── HostService ──────────────────────────────────────────────────

/// The frame loop.
pub struct HostService {
    config: HostConfig,
    host: Arc<ConsoleHost>,
    server: Arc<VConsoleServer>,
    running: Arc<AtomicBool>,
}

impl HostService {
    pub fn new(config: HostConfig) -> Self {
        let running = Arc::new(AtomicBool::new(false));
        let host = Arc::new(ConsoleHost::new(Arc::clone(&running)));
        let server = Arc::new(VConsoleServer::new(Arc::clone(&host)));
        host.attach(&server);

        server.set_max_connections(config.console.max_connections);
        server.set_logging(config.console.logging);
        server.set_capture_enabled(config.console.capture_output);

        Self {
            config,
            host,
            server,
            running,
        }
    }

    pub fn server(&self) -> &Arc<VConsoleServer> {
        &self.server
    }

    /// Obtain a handle that can be used to stop the service from
    /// another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the server. Fails if the port cannot be bound.
    pub fn attach(&self) -> Result<(), VConsoleError> {
        let console = &self.config.console;
        self.server.initialize(console.port, &console.bind)?;
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Tick the server until stopped, executing command lines as they
    /// arrive. The loop keeps ticking after `commands` closes.
    pub async fn run(&self, mut commands: mpsc::UnboundedReceiver<String>) -> Result<(), VConsoleError> {
        if !self.server.is_running() {
            self.attach()?;
        }

        let period = Duration::from_secs(1) / self.config.host.tick_rate_hz.max(1);
        let mut frames = tokio::time::interval(period);
        frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut input_open = true;

        while self.is_running() {
            tokio::select! {
                _ = frames.tick() => self.server.tick(),
                line = commands.recv(), if input_open => match line {
                    Some(line) => execute_server_command(self.host.as_ref(), &line),
                    None => input_open = false,
                },
            }
        }

        self.detach();
        Ok(())
    }

    /// Stop the server and restore the standard streams.
    pub fn detach(&self) {
        self.running.store(false, Ordering::SeqCst);
        if self.server.is_running() {
            self.server.shutdown();
            info!("console host stopped");
        }
    }
}

/// Lines typed on stdin.
///
/// Read on a plain thread: a blocking stdin read cannot be cancelled and
/// must not hold up runtime shutdown.
pub fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    let reader = std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });
    if let Err(e) = reader {
        warn!("stdin reader unavailable: {e}");
    }
    rx
}

// ── Tests ────────────────────────────────────────────────────────
