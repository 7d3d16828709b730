//! The Fstab Resolver: looks a device up in a [`TableCache`] table by
//! devnode, symlink alias, UUID, or label, per `spec.md` section 4.1.

use crate::error::TableKind;
use crate::table::{TableCache, TableEntry};

/// The identity facts the resolver needs about a device. Kept separate
/// from [`crate::device::Device`] so resolution can be unit-tested
/// without a real udev handle.
pub struct DeviceIdentity<'a> {
    pub devnode: &'a str,
    /// Symlink aliases (e.g. `/dev/mapper/vg-lv`), in kernel-reported order.
    pub aliases: &'a [String],
    pub fs_uuid: Option<&'a str>,
    pub fs_label: Option<&'a str>,
}

impl<'a> DeviceIdentity<'a> {
    fn is_device_mapper(&self) -> bool {
        self.devnode.starts_with("/dev/dm-")
    }
}

/// Resolution order: devnode (or, for device-mapper nodes, aliases in
/// kernel order) first, then `UUID=`, then `LABEL=`. First match wins.
pub fn find<'a>(
    cache: &'a TableCache,
    table: TableKind,
    device: &DeviceIdentity,
) -> Option<&'a TableEntry> {
    let entries = cache.entries(table);

    if device.is_device_mapper() {
        for alias in device.aliases {
            if let Some(entry) = entries.iter().find(|e| &e.device == alias) {
                return Some(entry);
            }
        }
    } else if let Some(entry) = entries.iter().find(|e| e.device == device.devnode) {
        return Some(entry);
    }

    if let Some(uuid) = device.fs_uuid {
        let tag = format!("UUID={uuid}");
        if let Some(entry) = entries.iter().find(|e| e.device == tag) {
            return Some(entry);
        }
    }

    if let Some(label) = device.fs_label {
        let tag = format!("LABEL={label}");
        if let Some(entry) = entries.iter().find(|e| e.device == tag) {
            return Some(entry);
        }
    }

    None
}

/// Composes [`find`] with the entry's option-string matcher.
pub fn has_option(
    cache: &TableCache,
    table: TableKind,
    device: &DeviceIdentity,
    option: &str,
) -> bool {
    find(cache, table, device)
        .map(|entry| entry.has_option(option))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TableEntry;
    use std::path::PathBuf;

    fn cache_with(entries: Vec<TableEntry>) -> TableCache {
        // TableCache only loads from disk, so round-trip through a temp file.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table");
        let text = entries
            .iter()
            .map(|e| format!("{} {} {} {} 0 0", e.device, e.mountpoint.display(), e.fstype, e.options))
            .collect::<Vec<_>>()
            .join("\n");
        std::fs::write(&path, text).unwrap();
        let mut cache = TableCache::new(path, "/dev/null");
        cache.reload(crate::error::TableKind::Admin).unwrap();
        cache
    }

    #[test]
    fn resolves_by_devnode() {
        let cache = cache_with(vec![TableEntry {
            device: "/dev/sdc1".into(),
            mountpoint: PathBuf::from("/media/backup"),
            fstype: "ext4".into(),
            options: "defaults".into(),
        }]);
        let identity = DeviceIdentity {
            devnode: "/dev/sdc1",
            aliases: &[],
            fs_uuid: None,
            fs_label: None,
        };
        let entry = find(&cache, TableKind::Admin, &identity).unwrap();
        assert_eq!(entry.mountpoint, PathBuf::from("/media/backup"));
    }

    #[test]
    fn device_mapper_falls_back_to_aliases() {
        let cache = cache_with(vec![TableEntry {
            device: "/dev/mapper/vg-lv".into(),
            mountpoint: PathBuf::from("/mnt/lv"),
            fstype: "ext4".into(),
            options: "defaults".into(),
        }]);
        let aliases = vec!["/dev/mapper/vg-lv".to_string()];
        let identity = DeviceIdentity {
            devnode: "/dev/dm-0",
            aliases: &aliases,
            fs_uuid: None,
            fs_label: None,
        };
        assert!(find(&cache, TableKind::Admin, &identity).is_some());

        // a direct match on the volatile dm-N devnode must not occur
        let identity_direct = DeviceIdentity {
            devnode: "/dev/dm-0",
            aliases: &[],
            fs_uuid: None,
            fs_label: None,
        };
        assert!(find(&cache, TableKind::Admin, &identity_direct).is_none());
    }

    #[test]
    fn falls_back_to_uuid_then_label() {
        let cache = cache_with(vec![TableEntry {
            device: "LABEL=PHOTOS".into(),
            mountpoint: PathBuf::from("/mnt/photos"),
            fstype: "vfat".into(),
            options: "defaults".into(),
        }]);
        let identity = DeviceIdentity {
            devnode: "/dev/sdb1",
            aliases: &[],
            fs_uuid: Some("1234-5678"),
            fs_label: Some("PHOTOS"),
        };
        assert!(find(&cache, TableKind::Admin, &identity).is_some());
    }

    #[test]
    fn has_option_checks_noauto() {
        let cache = cache_with(vec![TableEntry {
            device: "/dev/sdd1".into(),
            mountpoint: PathBuf::from("/mnt/x"),
            fstype: "ext4".into(),
            options: "noauto,users".into(),
        }]);
        let identity = DeviceIdentity {
            devnode: "/dev/sdd1",
            aliases: &[],
            fs_uuid: None,
            fs_label: None,
        };
        assert!(has_option(&cache, TableKind::Admin, &identity, "noauto"));
        assert!(!has_option(&cache, TableKind::Admin, &identity, "ro"));
    }
}
