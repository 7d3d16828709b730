//! The Hook Invoker: forks a helper, drops privileges, executes it
//! with a fixed argument vector, waits for exit (`spec.md` section
//! 4.7). Not invoked with daemon privileges.

use std::ffi::CString;
use std::path::Path;

use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{execv, fork, setgid, setuid, ForkResult, Gid, Uid};

/// `mount` or `unmount`, passed verbatim as argv[1] to the helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    Mount,
    Unmount,
}

impl HookAction {
    fn as_str(self) -> &'static str {
        match self {
            HookAction::Mount => "mount",
            HookAction::Unmount => "unmount",
        }
    }
}

/// Invokes the configured helper, or no-ops successfully if none is
/// configured. Failure (non-zero exit, signal, fork/exec error) is
/// logged by the caller and never unwinds the mount/unmount it's
/// attached to.
pub fn invoke(helper: Option<&Path>, action: HookAction, mountpoint: &Path, uid: Uid, gid: Gid) -> bool {
    let Some(helper) = helper else {
        return true;
    };

    let helper_c = match CString::new(helper.as_os_str().to_string_lossy().into_owned()) {
        Ok(c) => c,
        Err(_) => return false,
    };
    let action_c = CString::new(action.as_str()).unwrap();
    let mountpoint_c = match CString::new(mountpoint.as_os_str().to_string_lossy().into_owned()) {
        Ok(c) => c,
        Err(_) => return false,
    };

    // SAFETY: the child immediately drops privileges and execs; no
    // allocator state is shared across the fork beyond what execv needs.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child, .. }) => match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, 0)) => true,
            _ => false,
        },
        Ok(ForkResult::Child) => {
            if setgid(gid).is_err() || setuid(uid).is_err() {
                std::process::exit(127);
            }
            let argv = [helper_c.clone(), action_c, mountpoint_c];
            let _ = execv(&helper_c, &argv);
            // execv only returns on failure.
            std::process::exit(127);
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_helper_is_a_noop_success() {
        assert!(invoke(
            None,
            HookAction::Mount,
            Path::new("/mnt/PHOTOS"),
            Uid::from_raw(1000),
            Gid::from_raw(1000)
        ));
    }

    #[test]
    fn action_strings_match_the_wire_contract() {
        assert_eq!(HookAction::Mount.as_str(), "mount");
        assert_eq!(HookAction::Unmount.as_str(), "unmount");
    }
}
