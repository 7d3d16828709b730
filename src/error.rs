use std::fmt::Display;

/// Alias for a `Result` with the error type [`LdmError`].
pub type Result<T> = std::result::Result<T, LdmError>;

/// Which of the two mount tables an operation was acting on.
///
/// Used only to make [`LdmError::Parse`] messages specific; the rest of
/// the crate treats the two tables identically (see [`crate::table`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// The administrator-maintained table (`/etc/fstab`).
    Admin,
    /// The live kernel table (`/proc/self/mounts`).
    Kernel,
}

impl Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableKind::Admin => write!(f, "admin table"),
            TableKind::Kernel => write!(f, "kernel table"),
        }
    }
}

/// The error type for `ldm`.
///
/// Only the startup and fatal-inside-the-loop paths described in
/// `spec.md` section 7 are modeled as `LdmError`; routine admission and
/// mount/unmount outcomes are plain booleans decided by their callers.
#[derive(Debug)]
pub enum LdmError {
    /// A filesystem or syscall operation failed.
    Io(std::io::Error),
    /// A `nix`-mediated syscall failed (poll, fork, privilege drop, mount).
    Nix(nix::Error),
    /// The hotplug source could not be initialized.
    Udev(std::io::Error),
    /// An admin or kernel mount table failed to parse.
    Parse { table: TableKind, reason: String },
    /// A CLI usage error: missing/contradictory/unknown arguments.
    Usage(String),
    /// Another instance of the daemon is already running.
    AlreadyRunning,
    /// The process is not running as the superuser.
    NotSuperuser,
}

impl std::error::Error for LdmError {}

impl Display for LdmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LdmError::Io(err) => write!(f, "{err}"),
            LdmError::Nix(err) => write!(f, "{err}"),
            LdmError::Udev(err) => write!(f, "failed to initialize hotplug source: {err}"),
            LdmError::Parse { table, reason } => write!(f, "failed to parse {table}: {reason}"),
            LdmError::Usage(msg) => write!(f, "{msg}"),
            LdmError::AlreadyRunning => write!(f, "ldm is already running"),
            LdmError::NotSuperuser => write!(f, "ldm must be started as root"),
        }
    }
}

impl From<std::io::Error> for LdmError {
    fn from(value: std::io::Error) -> Self {
        LdmError::Io(value)
    }
}

impl From<nix::Error> for LdmError {
    fn from(value: nix::Error) -> Self {
        LdmError::Nix(value)
    }
}

/// Convenience constructor used by the table cache.
pub fn parse_error(table: TableKind, reason: impl Into<String>) -> LdmError {
    LdmError::Parse {
        table,
        reason: reason.into(),
    }
}
