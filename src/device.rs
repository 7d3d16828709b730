//! The Device entity (`spec.md` section 3) and the probe that turns a
//! raw udev device into the facts the lifecycle component decides on.

use std::path::{Path, PathBuf};

use crate::resolver::DeviceIdentity;

/// Device kind, derived from the kernel-reported device type and
/// id-type. The only dispatch in the system is by this tag (`spec.md`
/// section 9, Design Notes: "Polymorphism").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Volume,
    Optical,
    Unknown,
}

impl DeviceKind {
    pub fn classify(devtype: Option<&str>, id_type: Option<&str>) -> Self {
        if id_type == Some("cd") {
            DeviceKind::Optical
        } else if matches!(devtype, Some("disk") | Some("partition")) || id_type == Some("floppy") {
            DeviceKind::Volume
        } else {
            DeviceKind::Unknown
        }
    }
}

/// Filesystem tags that are never eligible for automounting: absent,
/// swap space, an LVM physical volume, or a LUKS container.
fn is_ineligible_filesystem(fs_type: Option<&str>) -> bool {
    match fs_type {
        None => true,
        Some(fs) => matches!(fs, "swap" | "LVM2_member" | "crypto_LUKS"),
    }
}

/// The raw facts read off a hotplugged or enumerated udev device,
/// ahead of any admission decision. Kept separate from [`Device`] so
/// the lifecycle's decisions are testable without a live udev handle.
#[derive(Debug, Clone)]
pub struct DeviceProbe {
    pub devnode: String,
    pub aliases: Vec<String>,
    pub devtype: Option<String>,
    pub id_type: Option<String>,
    pub fs_type: Option<String>,
    pub fs_usage: Option<String>,
    pub fs_uuid: Option<String>,
    pub fs_label: Option<String>,
    pub serial: Option<String>,
    pub cdrom_media: bool,
}

impl DeviceProbe {
    /// Reads the properties this crate cares about off a live udev
    /// device. Returns `None` if the device has no devnode (not a
    /// block device leaf we can mount).
    pub fn from_udev(device: &udev::Device) -> Option<Self> {
        let devnode = device.devnode()?.to_string_lossy().into_owned();
        let aliases = device
            .devlinks()
            .map(|link| link.to_string_lossy().into_owned())
            .collect();
        let prop = |key: &str| {
            device
                .property_value(key)
                .map(|v| v.to_string_lossy().into_owned())
        };
        Some(Self {
            devnode,
            aliases,
            devtype: device.devtype().map(|v| v.to_string_lossy().into_owned()),
            id_type: prop("ID_TYPE"),
            fs_type: prop("ID_FS_TYPE"),
            fs_usage: prop("ID_FS_USAGE"),
            fs_uuid: prop("ID_FS_UUID"),
            fs_label: prop("ID_FS_LABEL"),
            serial: prop("ID_SERIAL"),
            cdrom_media: prop("ID_CDROM_MEDIA").as_deref() == Some("1"),
        })
    }

    pub fn kind(&self) -> DeviceKind {
        DeviceKind::classify(self.devtype.as_deref(), self.id_type.as_deref())
    }

    pub fn identity(&self) -> DeviceIdentity<'_> {
        DeviceIdentity {
            devnode: &self.devnode,
            aliases: &self.aliases,
            fs_uuid: self.fs_uuid.as_deref(),
            fs_label: self.fs_label.as_deref(),
        }
    }

    /// Whether this probe's filesystem is one of the tags that never
    /// become live (`spec.md` section 3's invariant).
    pub fn has_ineligible_filesystem(&self) -> bool {
        is_ineligible_filesystem(self.fs_type.as_deref())
    }

    /// Whether media/usage is present for this device's kind
    /// (`spec.md` section 3: a `Volume` needs a filesystem-usage
    /// property, an `Optical` needs media present).
    pub fn media_present(&self) -> bool {
        match self.kind() {
            DeviceKind::Volume => self.fs_usage.is_some(),
            DeviceKind::Optical => self.cdrom_media,
            DeviceKind::Unknown => false,
        }
    }
}

/// A live, tracked removable device. Identity is the devnode; a live
/// `Device` always has a non-empty mountpoint (`spec.md` section 3).
pub struct Device {
    devnode: String,
    kind: DeviceKind,
    filesystem: Option<String>,
    mountpoint: PathBuf,
    // `None` only ever occurs in unit tests that don't go through a real
    // udev enumeration/monitor; every production `Device` carries `Some`.
    udev_handle: Option<udev::Device>,
}

impl Device {
    /// `udev_handle` is `None` only in unit tests that never touch a
    /// real udev context; every production `Device` is built with
    /// `Some` (see [`DeviceProbe::from_udev`] and the engine's
    /// enumeration/monitor loop).
    pub fn new(
        devnode: String,
        kind: DeviceKind,
        filesystem: Option<String>,
        mountpoint: PathBuf,
        udev_handle: Option<udev::Device>,
    ) -> Self {
        Self {
            devnode,
            kind,
            filesystem,
            mountpoint,
            udev_handle,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_test(devnode: &str, kind: DeviceKind, mountpoint: &str) -> Self {
        Self {
            devnode: devnode.to_string(),
            kind,
            filesystem: Some("vfat".to_string()),
            mountpoint: PathBuf::from(mountpoint),
            udev_handle: None,
        }
    }

    pub fn devnode(&self) -> &str {
        &self.devnode
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn filesystem(&self) -> Option<&str> {
        self.filesystem.as_deref()
    }

    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    pub fn udev_handle(&self) -> Option<&udev::Device> {
        self.udev_handle.as_ref()
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("devnode", &self.devnode)
            .field("kind", &self.kind)
            .field("filesystem", &self.filesystem)
            .field("mountpoint", &self.mountpoint)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_optical_by_id_type() {
        assert_eq!(
            DeviceKind::classify(Some("disk"), Some("cd")),
            DeviceKind::Optical
        );
    }

    #[test]
    fn classifies_partition_and_floppy_as_volume() {
        assert_eq!(DeviceKind::classify(Some("partition"), None), DeviceKind::Volume);
        assert_eq!(DeviceKind::classify(None, Some("floppy")), DeviceKind::Volume);
    }

    #[test]
    fn unknown_otherwise() {
        assert_eq!(DeviceKind::classify(None, None), DeviceKind::Unknown);
    }

    #[test]
    fn ineligible_filesystems() {
        assert!(is_ineligible_filesystem(None));
        assert!(is_ineligible_filesystem(Some("swap")));
        assert!(is_ineligible_filesystem(Some("LVM2_member")));
        assert!(is_ineligible_filesystem(Some("crypto_LUKS")));
        assert!(!is_ineligible_filesystem(Some("vfat")));
    }
}
