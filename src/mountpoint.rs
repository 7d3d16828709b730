//! The Mountpoint Synthesizer: picks the target directory for a
//! device, either from the admin table or by synthesizing a name from
//! label/UUID/serial under the mount root (`spec.md` section 4.3).

use std::path::{Path, PathBuf};

use crate::table::TableEntry;

/// The label/UUID/serial facts the synthesizer chooses a base name
/// from, in preference order.
pub struct SynthesisInput<'a> {
    pub label: Option<&'a str>,
    pub uuid: Option<&'a str>,
    pub serial: Option<&'a str>,
}

/// Picks a mountpoint for a candidate device.
///
/// Returns `None` if the admin table has no entry and none of
/// label/UUID/serial is available, or if collision-avoidance runs past
/// `libc::PATH_MAX` without finding a free path. Does not create the
/// directory; that is the lifecycle component's job, just before
/// mounting.
pub fn synthesize(
    mount_root: &Path,
    admin_entry: Option<&TableEntry>,
    input: &SynthesisInput,
) -> Option<PathBuf> {
    if let Some(entry) = admin_entry {
        return Some(entry.mountpoint.clone());
    }

    let base = input.label.or(input.uuid).or(input.serial)?;
    let joined = mount_root.join(base).to_string_lossy().replace(' ', "_");
    let mut candidate = PathBuf::from(joined);

    loop {
        if candidate.as_os_str().len() > libc::PATH_MAX as usize {
            return None;
        }
        if !candidate.exists() {
            return Some(candidate);
        }
        let mut widened = candidate.into_os_string();
        widened.push("_");
        candidate = PathBuf::from(widened);
    }
}
