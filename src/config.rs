use std::path::{Path, PathBuf};

use nix::unistd::{Gid, Uid};

/// Compile-time filesystem locations. `spec.md` section 6 calls these
/// "design defaults, all compile-time configurable" — there is no
/// runtime config file or environment-variable override, deliberately.
pub struct Paths;

impl Paths {
    /// Root directory under which synthesized mountpoints are created.
    pub const MOUNT_ROOT: &'static str = "/mnt/";
    /// Singleton guard pid-file.
    pub const PID_FILE: &'static str = "/run/ldm.pid";
    /// Named one-shot control pipe.
    pub const CONTROL_PIPE: &'static str = "/run/ldm.fifo";
    /// Administrator-maintained mount table.
    pub const ADMIN_TABLE: &'static str = "/etc/fstab";
    /// Live kernel mount table.
    pub const KERNEL_TABLE: &'static str = "/proc/self/mounts";
    /// The optional mount/unmount hook program. `spec.md` section 4.7
    /// and 6 describe the hook's contract but not how its path is
    /// configured; like the other paths this is a compile-time default,
    /// not a CLI flag.
    pub const HOOK_HELPER: &'static str = "/usr/lib/ldm/ldm-helper";

    pub fn mount_root() -> &'static Path {
        Path::new(Self::MOUNT_ROOT)
    }
}

/// Registry capacity. A design default, not an operator-tunable flag
/// (`spec.md` section 4.6).
pub const REGISTRY_CAPACITY: usize = 20;

/// The optional mount/unmount hook program. "When the configured helper
/// path is absent, the invocation is a no-op success" (`spec.md`
/// section 4.7) — resolved once at startup by checking whether
/// [`Paths::HOOK_HELPER`] exists, rather than failing startup if it
/// doesn't.
#[derive(Debug, Clone)]
pub struct HookConfig {
    pub helper: Option<PathBuf>,
}

impl Default for HookConfig {
    fn default() -> Self {
        let path = PathBuf::from(Paths::HOOK_HELPER);
        Self {
            helper: path.exists().then_some(path),
        }
    }
}

/// Resolved daemon configuration, built from CLI arguments.
#[derive(Debug, Clone)]
pub struct Config {
    pub uid: Uid,
    pub gid: Gid,
    pub hook: HookConfig,
    pub mount_root: PathBuf,
    pub pid_file: PathBuf,
    pub control_pipe: PathBuf,
    pub admin_table: PathBuf,
    pub kernel_table: PathBuf,
}

impl Config {
    pub fn new(uid: Uid, gid: Gid, hook: HookConfig) -> Self {
        Self {
            uid,
            gid,
            hook,
            mount_root: PathBuf::from(Paths::MOUNT_ROOT),
            pid_file: PathBuf::from(Paths::PID_FILE),
            control_pipe: PathBuf::from(Paths::CONTROL_PIPE),
            admin_table: PathBuf::from(Paths::ADMIN_TABLE),
            kernel_table: PathBuf::from(Paths::KERNEL_TABLE),
        }
    }
}
