//! The Singleton Guard: a pid-file that prevents two daemons from
//! racing on the same host (`spec.md` section 4.9). Presence alone is
//! the signal; no fcntl-style advisory locking is used.

use std::fs;
use std::path::{Path, PathBuf};

use nix::unistd::{getpid, unlink};

use crate::error::{LdmError, Result};

pub struct SingletonGuard {
    path: PathBuf,
}

impl SingletonGuard {
    /// Fails with [`LdmError::AlreadyRunning`] if the pid-file already
    /// exists; otherwise writes this process's pid to it.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.exists() {
            return Err(LdmError::AlreadyRunning);
        }
        fs::write(&path, format!("{}\n", getpid()))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the pid-file. Called explicitly on clean shutdown
    /// rather than solely relying on `Drop`, so the order relative to
    /// the rest of the shutdown path (`spec.md` section 5) is explicit
    /// at the call site.
    pub fn release(self) {
        let _ = unlink(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_writes_pid_and_release_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ldm.pid");
        let guard = SingletonGuard::acquire(&path).unwrap();
        assert!(path.exists());
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), getpid().to_string());
        guard.release();
        assert!(!path.exists());
    }

    #[test]
    fn acquire_fails_if_pid_file_already_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ldm.pid");
        fs::write(&path, "1\n").unwrap();
        assert!(matches!(
            SingletonGuard::acquire(&path),
            Err(LdmError::AlreadyRunning)
        ));
    }
}
