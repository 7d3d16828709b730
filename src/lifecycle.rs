//! The Device Lifecycle: `try_admit`, `mount`, `unmount`, and `change`
//! over a [`Device`] (`spec.md` section 4.4).

use std::path::PathBuf;

use nix::errno::Errno;
use nix::sys::stat::Mode;
use nix::unistd::{chown, mkdir, Gid, Uid};

use crate::device::{Device, DeviceKind, DeviceProbe};
use crate::error::TableKind;
use crate::hook::{self, HookAction};
use crate::mount_driver::MountDriver;
use crate::mountpoint::{self, SynthesisInput};
use crate::quirks::{self, Quirk};
use crate::registry::Registry;
use crate::resolver;
use crate::table::TableCache;

/// Everything a lifecycle operation needs: the registry it mutates,
/// the table cache it consults, the mount-root/uid/gid/hook
/// configuration, and the mount/unmount syscall seam. This is the
/// "single engine context" `spec.md` section 9's Design Notes call
/// for, scoped down to just what admission and mounting touch.
pub struct LifecycleCtx {
    pub registry: Registry,
    pub tables: TableCache,
    pub mount_root: PathBuf,
    pub uid: Uid,
    pub gid: Gid,
    pub hook_helper: Option<PathBuf>,
    pub driver: Box<dyn MountDriver>,
}

/// Constructs a candidate [`Device`] and registers it, or rejects it.
/// Rejection causes are checked in the order `spec.md` section 4.4
/// specifies; first match wins. On rejection no external side effect
/// remains (no directory created, nothing registered).
pub fn try_admit(
    ctx: &mut LifecycleCtx,
    probe: &DeviceProbe,
    udev_device: Option<udev::Device>,
) -> bool {
    // A devnode already tracked in the registry is a no-op, not a fresh
    // admission — preserves the "no two live Devices share a devnode"
    // invariant (`spec.md` section 3) across repeated hotplug `add`
    // events for the same device.
    if ctx.registry.find(&probe.devnode).is_some() {
        return false;
    }

    let identity = probe.identity();

    let noauto = resolver::find(&ctx.tables, TableKind::Admin, &identity)
        .map(|entry| entry.has_option("noauto"))
        .unwrap_or(false);
    if noauto {
        return false;
    }

    // Rust has no stable, recoverable allocation-failure path the way
    // the original C admission routine checked `malloc` returns; this
    // step of spec.md's rejection order has no analogue here (see
    // DESIGN.md).

    if probe.has_ineligible_filesystem() {
        return false;
    }

    if probe.kind() == DeviceKind::Unknown {
        return false;
    }

    if !probe.media_present() {
        return false;
    }

    let admin_entry = resolver::find(&ctx.tables, TableKind::Admin, &identity);
    let input = SynthesisInput {
        label: probe.fs_label.as_deref(),
        uuid: probe.fs_uuid.as_deref(),
        serial: probe.serial.as_deref(),
    };
    let Some(mountpoint) = mountpoint::synthesize(&ctx.mount_root, admin_entry, &input) else {
        return false;
    };

    let device = Device::new(
        probe.devnode.clone(),
        probe.kind(),
        probe.fs_type.clone(),
        mountpoint,
        udev_device,
    );
    ctx.registry.insert(device)
}

/// Admits the device, creates its mountpoint, and mounts it. Unwinds
/// through [`unmount`] on any failure after admission.
pub fn mount(
    ctx: &mut LifecycleCtx,
    probe: &DeviceProbe,
    udev_device: Option<udev::Device>,
) -> bool {
    let devnode = probe.devnode.clone();
    if !try_admit(ctx, probe, udev_device) {
        return false;
    }

    let (mountpoint, fstype, kind) = {
        let device = ctx
            .registry
            .find(&devnode)
            .expect("device was just admitted into the registry");
        (
            device.mountpoint().to_path_buf(),
            device.filesystem().unwrap_or_default().to_string(),
            device.kind(),
        )
    };

    // REDESIGN FLAG (spec.md section 9): the original passed decimal
    // 755 to the mode argument; this uses octal 0o755.
    if let Err(err) = mkdir(&mountpoint, Mode::from_bits_truncate(0o755)) {
        if err != Errno::EEXIST {
            log::error!("ldm: mkdir {}: {err}", mountpoint.display());
            unmount(ctx, &devnode);
            return false;
        }
    }

    let quirk_flags = quirks::quirks(&fstype);
    let options = quirks::options_fragment(quirk_flags, ctx.uid.as_raw(), ctx.gid.as_raw());
    let read_only = kind == DeviceKind::Optical;

    if let Err(err) = ctx
        .driver
        .mount(&devnode, &mountpoint, &fstype, &options, read_only)
    {
        log::error!("ldm: mount {devnode} on {}: {err}", mountpoint.display());
        unmount(ctx, &devnode);
        return false;
    }

    if !quirk_flags.contains(Quirk::OwnerFix) {
        if let Err(err) = chown(&mountpoint, Some(ctx.uid), Some(ctx.gid)) {
            log::error!("ldm: chown {}: {err}", mountpoint.display());
            unmount(ctx, &devnode);
            return false;
        }
    }

    if !hook::invoke(
        ctx.hook_helper.as_deref(),
        HookAction::Mount,
        &mountpoint,
        ctx.uid,
        ctx.gid,
    ) {
        log::warn!("ldm: mount hook failed for {}", mountpoint.display());
    }

    true
}

/// Locates the device by devnode *or* mountpoint (`spec.md` section
/// 4.6's `find`, used e.g. by the control channel which identifies a
/// device by either) and unmounts it. The platform unmount syscall
/// only runs if the kernel table currently shows the device mounted —
/// reloaded immediately before the check, since `/proc/self/mounts`
/// always reflects whatever just happened synchronously, unlike the
/// inotify/poll-driven reloads elsewhere in the event loop (see
/// DESIGN.md). Directory removal is best-effort; a non-empty directory
/// is left in place.
pub fn unmount(ctx: &mut LifecycleCtx, path: &str) -> bool {
    let Some((devnode, mountpoint)) = ctx
        .registry
        .find(path)
        .map(|d| (d.devnode().to_string(), d.mountpoint().to_path_buf()))
    else {
        return false;
    };

    let _ = ctx.tables.reload(TableKind::Kernel);
    let currently_mounted = ctx
        .tables
        .entries(TableKind::Kernel)
        .iter()
        .any(|entry| entry.device == devnode);

    if currently_mounted {
        if let Err(err) = ctx.driver.unmount(&mountpoint) {
            log::error!("ldm: unmount {devnode}: {err}");
            return false;
        }
    }

    let _ = std::fs::remove_dir(&mountpoint);

    if !hook::invoke(
        ctx.hook_helper.as_deref(),
        HookAction::Unmount,
        &mountpoint,
        ctx.uid,
        ctx.gid,
    ) {
        log::warn!("ldm: unmount hook failed for {}", mountpoint.display());
    }

    ctx.registry.remove(&devnode);
    true
}

/// Unmounts whatever was there, then admits and mounts whatever is
/// there now. Succeeds iff the mount half succeeds.
pub fn change(
    ctx: &mut LifecycleCtx,
    probe: &DeviceProbe,
    udev_device: Option<udev::Device>,
) -> bool {
    let devnode = probe.devnode.clone();
    let _ = unmount(ctx, &devnode);
    mount(ctx, probe, udev_device)
}
