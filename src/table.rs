//! The Table Cache: owns the two parsed mount tables (admin-config,
//! kernel-live) and reloads them atomically on demand.
//!
//! Both tables share the same five/six-column `fstab(5)` line shape
//! (`device mountpoint fstype options dump pass`), so a single parser
//! serves both; see `spec.md` section 4.1.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{parse_error, Result, TableKind};

/// One parsed line of an admin-table or kernel-table file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    /// The raw device field: a devnode, `UUID=...`, or `LABEL=...`.
    pub device: String,
    pub mountpoint: PathBuf,
    pub fstype: String,
    pub options: String,
}

impl TableEntry {
    /// Whether the comma-separated option list carries `option`.
    ///
    /// A leading `+` on a stored option is just an explicit presence
    /// assertion and does not change the match (`spec.md` 4.1).
    pub fn has_option(&self, option: &str) -> bool {
        self.options
            .split(',')
            .any(|field| field.trim_start_matches('+') == option)
    }
}

fn parse(path: &Path, kind: TableKind) -> Result<Vec<TableEntry>> {
    let text = fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let device = fields
            .next()
            .ok_or_else(|| parse_error(kind, format!("line {}: missing device field", lineno + 1)))?;
        let mountpoint = fields.next().ok_or_else(|| {
            parse_error(kind, format!("line {}: missing mountpoint field", lineno + 1))
        })?;
        let fstype = fields.next().unwrap_or("auto");
        let options = fields.next().unwrap_or("defaults");
        entries.push(TableEntry {
            device: device.to_string(),
            mountpoint: PathBuf::from(mountpoint),
            fstype: fstype.to_string(),
            options: options.to_string(),
        });
    }
    Ok(entries)
}

/// Owns both mount tables. Rebuilt wholesale on `reload`, never mutated
/// in place — consumers always see either the old table or the new
/// one, never a partially-parsed one.
#[derive(Debug, Default)]
pub struct TableCache {
    admin_path: PathBuf,
    kernel_path: PathBuf,
    admin: Vec<TableEntry>,
    kernel: Vec<TableEntry>,
}

impl TableCache {
    pub fn new(admin_path: impl Into<PathBuf>, kernel_path: impl Into<PathBuf>) -> Self {
        Self {
            admin_path: admin_path.into(),
            kernel_path: kernel_path.into(),
            admin: Vec::new(),
            kernel: Vec::new(),
        }
    }

    /// Fully discards and reparses the given table. Propagates parse
    /// failure; the caller decides whether that's fatal (it always is,
    /// per `spec.md` 4.1 and 7 — both at startup and inside the loop).
    pub fn reload(&mut self, table: TableKind) -> Result<()> {
        let entries = match table {
            TableKind::Admin => parse(&self.admin_path, table)?,
            TableKind::Kernel => parse(&self.kernel_path, table)?,
        };
        match table {
            TableKind::Admin => self.admin = entries,
            TableKind::Kernel => self.kernel = entries,
        }
        Ok(())
    }

    pub fn entries(&self, table: TableKind) -> &[TableEntry] {
        match table {
            TableKind::Admin => &self.admin,
            TableKind::Kernel => &self.kernel,
        }
    }

    /// The filesystem path this table is reloaded from — the engine
    /// needs these to set up the admin-table inotify watch and to open
    /// a standing handle on the kernel table for `poll`.
    pub fn path(&self, table: TableKind) -> &Path {
        match table {
            TableKind::Admin => &self.admin_path,
            TableKind::Kernel => &self.kernel_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn parses_comments_and_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let admin = write(
            &dir,
            "fstab",
            "# a comment\n\n/dev/sdc1  /media/backup  ext4  defaults 0 0\n",
        );
        let mut cache = TableCache::new(admin, dir.path().join("mounts"));
        cache.reload(TableKind::Admin).unwrap();
        let entries = cache.entries(TableKind::Admin);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].device, "/dev/sdc1");
        assert_eq!(entries[0].mountpoint, PathBuf::from("/media/backup"));
    }

    #[test]
    fn has_option_strips_leading_plus() {
        let entry = TableEntry {
            device: "/dev/sdb1".into(),
            mountpoint: "/mnt/x".into(),
            fstype: "vfat".into(),
            options: "+noauto,users".into(),
        };
        assert!(entry.has_option("noauto"));
        assert!(entry.has_option("users"));
        assert!(!entry.has_option("ro"));
    }

    #[test]
    fn reload_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = TableCache::new(dir.path().join("missing"), dir.path().join("mounts"));
        assert!(cache.reload(TableKind::Admin).is_err());
    }
}
