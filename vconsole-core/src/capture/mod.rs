//! Standard output / standard error capture.
//!
//! The process's stdout and stderr are redirected into capture channels
//! while duplicates of the original destinations keep receiving every
//! byte, so whoever was watching the terminal sees no difference. The
//! server drains the channels once per tick and turns the bytes into
//! `PRNT` lines.
//!
//! The platform part (how a stream gets redirected) sits behind the
//! [`Redirect`] trait; everything in this module is platform-agnostic.

#[cfg(test)]
pub(crate) mod mock;
#[cfg(unix)]
mod unix;

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;
use tracing_subscriber::fmt::MakeWriter;

use crate::error::VConsoleError;
use crate::network::transport::is_transient;
use crate::protocol::print::{COLOR_ERROR, MAX_TEXT_LEN, PrintMessage};

/// Bytes requested per read from a capture channel.
pub const CAPTURE_READ_SIZE: usize = 4096;

/// Reads per stream per drain. Bounds the work done in one tick when
/// the process is printing faster than the tick rate.
pub const MAX_READS_PER_DRAIN: usize = 64;

/// One redirected standard stream.
///
/// Dropping the value must restore the stream to its original
/// destination and release the capture channel.
pub trait Redirect: Send {
    /// Non-blocking read of captured bytes. Returns
    /// `ErrorKind::WouldBlock` when nothing is pending.
    fn read_captured(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write to the stream's original destination.
    fn write_original(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// An independent handle to the original destination.
    fn original_writer(&self) -> io::Result<Box<dyn Write + Send>>;
}

/// Redirect the real stdout and stderr of this process.
#[cfg(unix)]
pub fn redirect_std_streams() -> Result<(Box<dyn Redirect>, Box<dyn Redirect>), VConsoleError> {
    let stdout = unix::FdRedirect::new(libc::STDOUT_FILENO).map_err(VConsoleError::Capture)?;
    let stderr = unix::FdRedirect::new(libc::STDERR_FILENO).map_err(VConsoleError::Capture)?;
    Ok((Box::new(stdout), Box::new(stderr)))
}

#[cfg(not(unix))]
pub fn redirect_std_streams() -> Result<(Box<dyn Redirect>, Box<dyn Redirect>), VConsoleError> {
    Err(VConsoleError::CaptureUnsupported)
}

#[cfg(unix)]
pub use unix::FdRedirect;

// ── LocalSink ────────────────────────────────────────────────────

type SharedWriter = Arc<Mutex<Option<Box<dyn Write + Send>>>>;

/// Where local log output should go: the preserved original stdout
/// while capture is active, the real stdout otherwise.
///
/// Writing there keeps the server's own log lines on the terminal
/// without feeding them back into the capture channel.
#[derive(Clone, Default)]
pub struct LocalSink {
    preserved: SharedWriter,
}

impl LocalSink {
    fn set(&self, writer: Option<Box<dyn Write + Send>>) {
        *self.preserved.lock().unwrap_or_else(PoisonError::into_inner) = writer;
    }

    /// Returns `true` while output goes to a preserved original stream.
    pub fn is_redirected(&self) -> bool {
        self.preserved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Write `bytes` to the preserved stdout. Returns `Ok(false)` when
    /// capture is inactive and nothing was written.
    pub fn write_preserved(&self, bytes: &[u8]) -> io::Result<bool> {
        let mut guard = self.preserved.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(writer) => {
                writer.write_all(bytes)?;
                writer.flush()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// A `tracing_subscriber` writer bound to this sink.
    pub fn writer(&self) -> LocalWriter {
        LocalWriter { sink: self.clone() }
    }
}

/// `MakeWriter` for log subscribers; see [`LocalSink`].
#[derive(Clone)]
pub struct LocalWriter {
    sink: LocalSink,
}

impl Write for LocalWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.sink.write_preserved(buf)? {
            Ok(buf.len())
        } else {
            io::stdout().write(buf)
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

impl<'a> MakeWriter<'a> for LocalWriter {
    type Writer = LocalWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// ── OutputCapture ────────────────────────────────────────────────

pub struct OutputCapture {
    stdout: Option<Box<dyn Redirect>>,
    stderr: Option<Box<dyn Redirect>>,
    partial_line: Vec<u8>,
    sink: LocalSink,
}

impl Default for OutputCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputCapture {
    /// An inactive capture.
    pub fn new() -> Self {
        Self {
            stdout: None,
            stderr: None,
            partial_line: Vec::new(),
            sink: LocalSink::default(),
        }
    }

    /// The sink that follows this capture's active state.
    pub fn sink(&self) -> LocalSink {
        self.sink.clone()
    }

    pub fn is_active(&self) -> bool {
        self.stdout.is_some()
    }

    /// Redirect the process's standard streams. A no-op while active.
    pub fn setup(&mut self) -> Result<(), VConsoleError> {
        if self.is_active() {
            return Ok(());
        }
        let (stdout, stderr) = redirect_std_streams()?;
        self.install(stdout, stderr);
        Ok(())
    }

    /// Activate with caller-provided redirects.
    pub fn install(&mut self, stdout: Box<dyn Redirect>, stderr: Box<dyn Redirect>) {
        self.cleanup();
        match stdout.original_writer() {
            Ok(writer) => self.sink.set(Some(writer)),
            Err(e) => debug!(error = %e, "no preserved stdout handle for local logging"),
        }
        self.stdout = Some(stdout);
        self.stderr = Some(stderr);
    }

    /// Restore the original streams. Safe to call when never set up.
    ///
    /// A partial stdout line still buffered is lost to clients; it has
    /// already reached the original stream.
    pub fn cleanup(&mut self) {
        self.sink.set(None);
        self.stdout = None;
        self.stderr = None;
        self.partial_line.clear();
    }

    /// Drain both channels and return the lines to broadcast, stdout
    /// first. Every drained byte is also written to its original
    /// destination.
    pub fn drain(&mut self) -> Vec<PrintMessage> {
        let mut lines = Vec::new();

        if let Some(stdout) = self.stdout.as_mut() {
            for chunk in drain_stream(stdout.as_mut()) {
                self.partial_line.extend_from_slice(&chunk);
                let complete = take_complete_lines(&mut self.partial_line);
                let overflow = take_oversized(&mut self.partial_line);
                lines.extend(
                    complete
                        .into_iter()
                        .chain(overflow)
                        .flat_map(|text| PrintMessage::new(text).into_chunks()),
                );
            }
        }

        if let Some(stderr) = self.stderr.as_mut() {
            for chunk in drain_stream(stderr.as_mut()) {
                lines.extend(
                    split_lines(&chunk).map(|line| PrintMessage::new(line).with_color(COLOR_ERROR)),
                );
            }
        }

        lines
    }

    /// Bytes of stdout waiting for a newline.
    pub fn pending_partial(&self) -> usize {
        self.partial_line.len()
    }
}

/// Read everything currently pending, one chunk per read, echoing each
/// chunk to the original destination.
fn drain_stream(stream: &mut dyn Redirect) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut buf = [0u8; CAPTURE_READ_SIZE];
    for _ in 0..MAX_READS_PER_DRAIN {
        match stream.read_captured(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if let Err(e) = stream.write_original(&buf[..n]) {
                    debug!(error = %e, "failed to echo captured output");
                }
                chunks.push(buf[..n].to_vec());
            }
            Err(e) if is_transient(&e) => break,
            Err(e) => {
                debug!(error = %e, "capture read failed");
                break;
            }
        }
    }
    chunks
}

/// Pop every newline-terminated line off the front of `buf`, keeping the
/// newline. Whatever follows the last newline stays in `buf`.
fn take_complete_lines(buf: &mut Vec<u8>) -> Vec<String> {
    let cut = buf.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
    let complete: Vec<u8> = buf.drain(..cut).collect();
    split_lines(&complete).collect()
}

/// Cut a partial line that no longer fits one `PRNT` into sendable
/// pieces, leaving less than [`MAX_TEXT_LEN`] bytes behind. A cut never
/// splits a UTF-8 sequence.
fn take_oversized(buf: &mut Vec<u8>) -> Vec<String> {
    let mut pieces = Vec::new();
    while buf.len() >= MAX_TEXT_LEN {
        let mut cut = MAX_TEXT_LEN;
        while cut > MAX_TEXT_LEN - 3 && buf.get(cut).is_some_and(|&b| b & 0xC0 == 0x80) {
            cut -= 1;
        }
        let piece: Vec<u8> = buf.drain(..cut).collect();
        pieces.push(String::from_utf8_lossy(&piece).into_owned());
    }
    pieces
}

/// Split into lines that keep their newline; a trailing fragment
/// without one is yielded as-is.
fn split_lines(bytes: &[u8]) -> impl Iterator<Item = String> + '_ {
    bytes
        .split_inclusive(|&b| b == b'\n')
        .map(|line| String::from_utf8_lossy(line).into_owned())
}
