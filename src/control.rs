//! The Control Channel: a named one-shot pipe, reopened per message
//! (`spec.md` section 4.8).

use std::fs::File;
use std::io::Read;
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use nix::sys::stat::Mode;
use nix::unistd::unlink;

use crate::error::Result;

/// A parsed control-channel message, or nothing if the message was
/// empty or carried an unknown command byte (both silently dropped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// `R<path>`: unmount the device identified by `path` (devnode or
    /// mountpoint), a single trailing `/` stripped.
    Remove(String),
}

fn parse(bytes: &[u8]) -> Option<ControlMessage> {
    let (&command, argument) = bytes.split_first()?;
    match command {
        b'R' => {
            let path = String::from_utf8_lossy(argument);
            let path = path.strip_suffix('/').unwrap_or(&path);
            if path.is_empty() {
                None
            } else {
                Some(ControlMessage::Remove(path.to_string()))
            }
        }
        _ => None,
    }
}

/// Owns the control pipe's filesystem path and the currently-open read
/// end. One message is read per open; after that the reader is
/// dropped and [`ControlChannel::reopen`] is called, which both drains
/// any remaining bytes and lets a subsequent writer reconnect.
pub struct ControlChannel {
    path: PathBuf,
    file: File,
}

impl ControlChannel {
    /// Creates the pipe (mode `0o666`, world-writable) if it doesn't
    /// already exist, and opens the read end.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            nix::unistd::mkfifo(&path, Mode::from_bits_truncate(0o666))?;
        }
        // O_RDWR so the read end never sees EOF between writers.
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)?;
        Ok(Self { path, file })
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Reads one message and parses it.
    ///
    /// A single bounded `read()`, not `read_to_end`: the fd is opened
    /// `O_RDWR` (see [`ControlChannel::create`]), so this process is
    /// always its own writer and the kernel never delivers EOF to the
    /// read side. `read_to_end` loops until EOF, which would never
    /// come and would block the single-threaded event loop forever on
    /// the first message. One `read()` call returns whatever is
    /// currently queued in the pipe (the `poll` readiness that woke
    /// the loop guarantees at least one byte is available) and that is
    /// the whole message, per the one-read-per-open wire contract.
    pub fn recv(&mut self) -> Result<Option<ControlMessage>> {
        let mut buf = [0u8; 4096];
        let n = self.file.read(&mut buf)?;
        Ok(parse(&buf[..n]))
    }

    /// Closes and reopens the pipe, per the one-message-per-open contract.
    pub fn reopen(&mut self) -> Result<()> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)?;
        self.file = file;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        let _ = unlink(&self.path);
    }
}
