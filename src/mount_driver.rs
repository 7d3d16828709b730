//! The seam between the lifecycle component's *decisions* (which
//! options, which path, read-only or not) and the actual `mount(2)`/
//! `umount2(2)` syscalls. Keeping this behind a trait means the
//! lifecycle's branching is unit-testable without `CAP_SYS_ADMIN`
//! (`SPEC_FULL.md`, "Test tooling").

use std::path::Path;

use nix::mount::{mount, umount2, MntFlags, MsFlags};

/// Performs (or fakes) the platform mount/unmount primitives.
pub trait MountDriver {
    fn mount(
        &mut self,
        source: &str,
        target: &Path,
        fstype: &str,
        options: &str,
        read_only: bool,
    ) -> std::io::Result<()>;

    fn unmount(&mut self, target: &Path) -> std::io::Result<()>;
}

/// The real driver, backed by `nix::mount`.
#[derive(Debug, Default)]
pub struct SystemMountDriver;

impl MountDriver for SystemMountDriver {
    fn mount(
        &mut self,
        source: &str,
        target: &Path,
        fstype: &str,
        options: &str,
        read_only: bool,
    ) -> std::io::Result<()> {
        let mut flags = MsFlags::empty();
        if read_only {
            flags |= MsFlags::MS_RDONLY;
        }
        mount(Some(source), target, Some(fstype), flags, Some(options))
            .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
    }

    fn unmount(&mut self, target: &Path) -> std::io::Result<()> {
        umount2(target, MntFlags::empty())
            .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Mount {
            source: String,
            target: std::path::PathBuf,
            fstype: String,
            options: String,
            read_only: bool,
        },
        Unmount {
            target: std::path::PathBuf,
        },
    }

    /// Records every call instead of touching the kernel, behind a
    /// shared `Rc<RefCell<_>>` so a test can hold a handle to the call
    /// log (`FakeMountDriver::handle`) while the driver itself has been
    /// moved into a `Box<dyn MountDriver>` inside the lifecycle context.
    #[derive(Debug, Default)]
    pub struct FakeMountDriver {
        calls: Rc<RefCell<Vec<Call>>>,
        pub mount_should_fail: bool,
        pub unmount_should_fail: bool,
    }

    impl FakeMountDriver {
        /// A second handle onto this driver's call log, to keep outside
        /// the `Box<dyn MountDriver>` moved into a `LifecycleCtx`.
        pub fn handle(&self) -> Rc<RefCell<Vec<Call>>> {
            self.calls.clone()
        }
    }

    impl MountDriver for FakeMountDriver {
        fn mount(
            &mut self,
            source: &str,
            target: &Path,
            fstype: &str,
            options: &str,
            read_only: bool,
        ) -> std::io::Result<()> {
            self.calls.borrow_mut().push(Call::Mount {
                source: source.to_string(),
                target: target.to_path_buf(),
                fstype: fstype.to_string(),
                options: options.to_string(),
                read_only,
            });
            if self.mount_should_fail {
                return Err(std::io::Error::other("fake mount failure"));
            }
            Ok(())
        }

        fn unmount(&mut self, target: &Path) -> std::io::Result<()> {
            self.calls.borrow_mut().push(Call::Unmount {
                target: target.to_path_buf(),
            });
            if self.unmount_should_fail {
                return Err(std::io::Error::other("fake unmount failure"));
            }
            Ok(())
        }
    }
}
