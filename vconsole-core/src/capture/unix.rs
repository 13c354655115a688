//! File-descriptor redirection through an anonymous pipe.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use super::Redirect;

/// A descriptor rerouted into a pipe.
///
/// While alive, everything written to `target` lands in the pipe and a
/// duplicate of the original descriptor stays available for echoing.
/// Dropping restores `target` and forwards whatever is left in the pipe.
pub struct FdRedirect {
    target: RawFd,
    original: File,
    read_end: File,
    // Keeps the pipe open even if `target` is closed by someone else.
    _write_end: OwnedFd,
}

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

fn set_flag(fd: RawFd, get: libc::c_int, set: libc::c_int, flag: libc::c_int) -> io::Result<()> {
    // SAFETY: fcntl on a descriptor we own, with integer arguments only.
    unsafe {
        let current = cvt(libc::fcntl(fd, get))?;
        cvt(libc::fcntl(fd, set, current | flag))?;
    }
    Ok(())
}

impl FdRedirect {
    pub fn new(target: RawFd) -> io::Result<Self> {
        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: `fds` is a valid two-element buffer.
        cvt(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
        // SAFETY: pipe() just handed us both descriptors.
        let (read_end, write_end) = unsafe { (File::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

        // SAFETY: dup() of a caller-supplied descriptor; the result is
        // owned by `original` below.
        let saved = cvt(unsafe { libc::dup(target) })?;
        // SAFETY: `saved` is a fresh descriptor nobody else owns.
        let original = unsafe { File::from_raw_fd(saved) };

        for fd in [read_end.as_raw_fd(), write_end.as_raw_fd(), original.as_raw_fd()] {
            set_flag(fd, libc::F_GETFD, libc::F_SETFD, libc::FD_CLOEXEC)?;
        }
        set_flag(read_end.as_raw_fd(), libc::F_GETFL, libc::F_SETFL, libc::O_NONBLOCK)?;

        // SAFETY: both descriptors are valid; dup2 replaces `target`.
        cvt(unsafe { libc::dup2(write_end.as_raw_fd(), target) })?;

        Ok(Self {
            target,
            original,
            read_end,
            _write_end: write_end,
        })
    }
}

impl Redirect for FdRedirect {
    fn read_captured(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_end.read(buf)
    }

    fn write_original(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.original.write_all(bytes)
    }

    fn original_writer(&self) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(self.original.try_clone()?))
    }
}

impl Drop for FdRedirect {
    fn drop(&mut self) {
        // SAFETY: `original` is a valid duplicate of what `target` was.
        unsafe {
            libc::dup2(self.original.as_raw_fd(), self.target);
        }
        let mut buf = [0u8; 4096];
        while let Ok(n) = self.read_end.read(&mut buf) {
            if n == 0 || self.original.write_all(&buf[..n]).is_err() {
                break;
            }
        }
    }
}
