//! The Event Loop & Dispatcher (`spec.md` section 4.5): the four-source
//! multi-wait loop that classifies readiness in priority order and
//! folds each event into the lifecycle's registry, plus the startup
//! enumeration pass `SPEC_FULL.md`'s "Startup Enumeration" module adds
//! ahead of it.

use std::fs::File;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use inotify::{Inotify, WatchMask};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::control::{ControlChannel, ControlMessage};
use crate::device::DeviceProbe;
use crate::error::{LdmError, Result, TableKind};
use crate::lifecycle::{self, LifecycleCtx};

/// Set by the termination-signal handler; observed after each `poll`
/// return. `spec.md` section 5: "the only signal-handler action
/// required is setting the termination flag; all cleanup runs on the
/// main thread after the multi-wait returns."
pub static RUNNING: AtomicBool = AtomicBool::new(true);

extern "C" fn request_shutdown(_signum: libc::c_int) {
    RUNNING.store(false, Ordering::SeqCst);
}

/// Installs handlers for the normal termination signals plus hangup
/// (`spec.md` section 5: "any of the normal termination signals, plus
/// hangup"). No signal is ever forwarded to in-progress hook children;
/// they are always waited on to completion by the parent.
pub fn install_signal_handlers() -> Result<()> {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
    let action = SigAction::new(
        SigHandler::Handler(request_shutdown),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for signal in [Signal::SIGTERM, Signal::SIGINT, Signal::SIGHUP] {
        unsafe { sigaction(signal, &action) }?;
    }
    Ok(())
}

/// Owns every long-lived resource the event loop multiplexes: the
/// lifecycle context (registry + table cache + mount/unmount seam),
/// the udev hotplug monitor, the admin-table inotify watch, a standing
/// handle on the kernel table file (polled for error-readiness per
/// `spec.md` section 2), and the control channel.
pub struct Engine {
    ctx: LifecycleCtx,
    monitor: udev::MonitorSocket,
    admin_watch: Inotify,
    kernel_table_file: File,
    control: ControlChannel,
}

impl Engine {
    /// Opens the hotplug monitor, the admin-table inotify watch, the
    /// kernel-table poll handle, and the control pipe. Failure to
    /// initialize any of these is a startup error (`spec.md` section
    /// 7): the caller propagates it and the process exits non-zero.
    pub fn new(ctx: LifecycleCtx, control_pipe: &Path) -> Result<Self> {
        let monitor = udev::MonitorBuilder::new()
            .map_err(LdmError::Udev)?
            .match_subsystem("block")
            .map_err(LdmError::Udev)?
            .listen()
            .map_err(LdmError::Udev)?;

        let mut admin_watch = Inotify::init().map_err(LdmError::Udev)?;
        admin_watch
            .watches()
            .add(
                ctx.tables.path(TableKind::Admin),
                WatchMask::MODIFY | WatchMask::CLOSE_WRITE | WatchMask::MOVE_SELF,
            )
            .map_err(LdmError::Udev)?;

        let kernel_table_file = File::open(ctx.tables.path(TableKind::Kernel))?;
        let control = ControlChannel::create(control_pipe)?;

        Ok(Self {
            ctx,
            monitor,
            admin_watch,
            kernel_table_file,
            control,
        })
    }

    /// Sweeps already-attached block devices through the same
    /// `try_admit`/`mount` path a hotplug `add` would take. Run once,
    /// before the first `poll`, so devices inserted before the daemon
    /// started are mounted without waiting for a replug.
    pub fn enumerate_existing(&mut self) {
        let mut enumerator = match udev::Enumerator::new() {
            Ok(e) => e,
            Err(err) => {
                log::warn!("ldm: startup enumeration unavailable: {err}");
                return;
            }
        };
        if let Err(err) = enumerator.match_subsystem("block") {
            log::warn!("ldm: startup enumeration unavailable: {err}");
            return;
        }
        let devices = match enumerator.scan_devices() {
            Ok(devices) => devices,
            Err(err) => {
                log::warn!("ldm: startup enumeration unavailable: {err}");
                return;
            }
        };
        for device in devices {
            if let Some(probe) = DeviceProbe::from_udev(&device) {
                lifecycle::mount(&mut self.ctx, &probe, Some(device));
            }
        }
    }

    /// Runs the multi-wait loop until a termination signal is observed.
    /// Table-reload failures inside the loop are fatal (`spec.md`
    /// section 7): the loop exits and `Err` propagates to `main`.
    pub fn run(&mut self) -> Result<()> {
        while RUNNING.load(Ordering::SeqCst) {
            // SAFETY: each fd outlives the `poll` call it's borrowed for.
            let hotplug_fd = unsafe { BorrowedFd::borrow_raw(self.monitor.as_raw_fd()) };
            let admin_fd = unsafe { BorrowedFd::borrow_raw(self.admin_watch.as_raw_fd()) };
            let kernel_fd = unsafe { BorrowedFd::borrow_raw(self.kernel_table_file.as_raw_fd()) };
            let control_fd = unsafe { BorrowedFd::borrow_raw(self.control.as_raw_fd()) };

            let mut fds = [
                PollFd::new(hotplug_fd, PollFlags::POLLIN),
                PollFd::new(admin_fd, PollFlags::POLLIN),
                PollFd::new(kernel_fd, PollFlags::POLLPRI | PollFlags::POLLERR),
                PollFd::new(control_fd, PollFlags::POLLIN),
            ];

            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => {}
                Err(nix::errno::Errno::EINTR) => continue,
                Err(err) => return Err(err.into()),
            }

            if !RUNNING.load(Ordering::SeqCst) {
                break;
            }

            let hotplug_ready = fds[0]
                .revents()
                .is_some_and(|r| r.contains(PollFlags::POLLIN));
            let admin_ready = fds[1]
                .revents()
                .is_some_and(|r| r.contains(PollFlags::POLLIN));
            let kernel_ready = fds[2]
                .revents()
                .is_some_and(|r| r.intersects(PollFlags::POLLPRI | PollFlags::POLLERR));
            let control_ready = fds[3]
                .revents()
                .is_some_and(|r| r.contains(PollFlags::POLLIN));

            // Priority order per `spec.md` section 4.5; all ready
            // branches are serviced within the same wakeup.
            if hotplug_ready {
                self.handle_hotplug();
            }
            if admin_ready {
                self.handle_admin_table_change()?;
            }
            if kernel_ready {
                self.handle_kernel_table_change()?;
            }
            if control_ready {
                self.handle_control();
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Receives one device event and dispatches on its action string.
    /// Unknown actions are ignored.
    fn handle_hotplug(&mut self) {
        let Some(event) = self.monitor.next() else {
            return;
        };
        let action = event.event_type();
        let device = event.device();
        let Some(probe) = DeviceProbe::from_udev(&device) else {
            return;
        };
        match action {
            udev::EventType::Add => {
                lifecycle::mount(&mut self.ctx, &probe, Some(device));
            }
            udev::EventType::Remove => {
                lifecycle::unmount(&mut self.ctx, &probe.devnode);
            }
            udev::EventType::Change => {
                lifecycle::change(&mut self.ctx, &probe, Some(device));
            }
            _ => {}
        }
    }

    /// Consumes one notification's bytes (the payload is discarded —
    /// the fact of change is the signal) and reloads the admin table.
    fn handle_admin_table_change(&mut self) -> Result<()> {
        let mut buffer = [0u8; 4096];
        let _ = self.admin_watch.read_events(&mut buffer);
        self.ctx.tables.reload(TableKind::Admin)
    }

    /// Reloads the kernel table, then reconciles: any registered Device
    /// the kernel no longer shows as mounted is unmounted, handling an
    /// external unmount behind the daemon's back.
    fn handle_kernel_table_change(&mut self) -> Result<()> {
        self.ctx.tables.reload(TableKind::Kernel)?;
        for devnode in self.ctx.registry.devnodes() {
            let still_mounted = self
                .ctx
                .tables
                .entries(TableKind::Kernel)
                .iter()
                .any(|entry| entry.device == devnode);
            if !still_mounted {
                lifecycle::unmount(&mut self.ctx, &devnode);
            }
        }
        Ok(())
    }

    /// Reads one control-channel message, dispatches it, then reopens
    /// the pipe per the one-message-per-open contract.
    fn handle_control(&mut self) {
        match self.control.recv() {
            Ok(Some(ControlMessage::Remove(path))) => {
                lifecycle::unmount(&mut self.ctx, &path);
            }
            Ok(None) => {}
            Err(err) => log::warn!("ldm: control channel read failed: {err}"),
        }
        if let Err(err) = self.control.reopen() {
            log::error!("ldm: failed to reopen control channel: {err}");
        }
    }

    /// Unmounts every currently-held device, in registry slot order.
    /// `Registry` itself has no notion of hooks or the mount driver, so
    /// this lives here rather than as a `Registry::clear` method.
    fn shutdown(&mut self) {
        for devnode in self.ctx.registry.devnodes() {
            lifecycle::unmount(&mut self.ctx, &devnode);
        }
    }
}
