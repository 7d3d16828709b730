//! The Quirks Table: a pure function from filesystem name to a bitmask
//! of mount-option/ownership quirks (`spec.md` section 4.2).

use enumflags2::{bitflags, BitFlags};

/// Filesystem-specific deviations from default mount behavior.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quirk {
    /// Mount with an explicit `uid`/`gid` instead of the post-mount chown.
    OwnerFix = 1 << 0,
    /// Mount with `utf8`.
    Utf8 = 1 << 1,
    /// Mount with a permissive `dmask`/`fmask`.
    Mask = 1 << 2,
    /// Mount with `flush`.
    Flush = 1 << 3,
}

/// The fixed filesystem-name-to-quirk table of `spec.md` section 4.2.
/// Any filesystem not listed carries no quirks.
pub fn quirks(fs_name: &str) -> BitFlags<Quirk> {
    use Quirk::*;
    match fs_name {
        "msdos" | "umsdos" => OwnerFix | Utf8,
        "vfat" => OwnerFix | Utf8 | Mask | Flush,
        "exfat" => OwnerFix.into(),
        "ntfs" => OwnerFix | Utf8,
        "iso9660" => OwnerFix | Utf8,
        "udf" => OwnerFix.into(),
        _ => BitFlags::empty(),
    }
}

/// Assembles the canonical comma-joined option fragment for the given
/// quirk bitmask, in the fixed order `OwnerFix, Utf8, Flush, Mask`,
/// with no trailing comma.
pub fn options_fragment(flags: BitFlags<Quirk>, uid: u32, gid: u32) -> String {
    let mut parts = Vec::with_capacity(4);
    if flags.contains(Quirk::OwnerFix) {
        parts.push(format!("uid={uid},gid={gid}"));
    }
    if flags.contains(Quirk::Utf8) {
        parts.push("utf8".to_string());
    }
    if flags.contains(Quirk::Flush) {
        parts.push("flush".to_string());
    }
    if flags.contains(Quirk::Mask) {
        parts.push("dmask=000,fmask=111".to_string());
    }
    parts.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vfat_gets_all_four_quirks_in_order() {
        let flags = quirks("vfat");
        assert_eq!(
            options_fragment(flags, 1000, 1000),
            "uid=1000,gid=1000,utf8,flush,dmask=000,fmask=111"
        );
    }

    #[test]
    fn iso9660_has_no_mask_or_flush() {
        let flags = quirks("iso9660");
        assert_eq!(options_fragment(flags, 1000, 1000), "uid=1000,gid=1000,utf8");
    }

    #[test]
    fn ext4_has_no_quirks() {
        assert_eq!(quirks("ext4"), BitFlags::empty());
        assert_eq!(options_fragment(quirks("ext4"), 1000, 1000), "");
    }

    #[test]
    fn exfat_and_udf_only_fix_ownership() {
        assert_eq!(options_fragment(quirks("exfat"), 1, 2), "uid=1,gid=2");
        assert_eq!(options_fragment(quirks("udf"), 1, 2), "uid=1,gid=2");
    }
}
