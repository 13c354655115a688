//! Scripted redirects for unit tests.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use super::Redirect;

/// Handle for feeding a [`ScriptedRedirect`] and inspecting what it
/// echoed to its "original" stream.
#[derive(Clone, Default)]
pub struct Script {
    reads: Arc<Mutex<VecDeque<Vec<u8>>>>,
    echoed: Arc<Mutex<Vec<u8>>>,
}

impl Script {
    /// Queue bytes as if the process had written them.
    pub fn push(&self, bytes: &[u8]) {
        self.reads.lock().unwrap().push_back(bytes.to_vec());
    }

    pub fn echoed(&self) -> Vec<u8> {
        self.echoed.lock().unwrap().clone()
    }

    pub fn redirect(&self) -> Box<dyn Redirect> {
        Box::new(ScriptedRedirect {
            script: self.clone(),
        })
    }
}

/// Each queued chunk comes back from exactly one read.
pub struct ScriptedRedirect {
    script: Script,
}

struct Echo(Arc<Mutex<Vec<u8>>>);

impl Write for Echo {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Redirect for ScriptedRedirect {
    fn read_captured(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.script.reads.lock().unwrap().pop_front() {
            Some(chunk) => {
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            None => Err(io::ErrorKind::WouldBlock.into()),
        }
    }

    fn write_original(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.script.echoed.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }

    fn original_writer(&self) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(Echo(Arc::clone(&self.script.echoed))))
    }
}
