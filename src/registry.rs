//! The Device Registry: a fixed-capacity associative store of
//! currently-tracked devices, keyed by devnode, with lookup by devnode
//! *or* mountpoint (`spec.md` section 4.6).

use crate::device::Device;

/// A bounded set of [`Device`]s. Insertion fails silently once the
/// registry is at capacity; the caller (the lifecycle component)
/// treats that as an admission rejection.
pub struct Registry {
    slots: Vec<Option<Device>>,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Inserts `device` into the first empty slot. Returns `false`
    /// without side effects if the registry is full.
    pub fn insert(&mut self, device: Device) -> bool {
        for slot in &mut self.slots {
            if slot.is_none() {
                *slot = Some(device);
                return true;
            }
        }
        false
    }

    /// Removes and returns the device with the given devnode, if any.
    pub fn remove(&mut self, devnode: &str) -> Option<Device> {
        for slot in &mut self.slots {
            if matches!(slot, Some(d) if d.devnode() == devnode) {
                return slot.take();
            }
        }
        None
    }

    /// Looks up a device whose devnode *or* mountpoint equals `path`.
    pub fn find(&self, path: &str) -> Option<&Device> {
        self.slots.iter().flatten().find(|d| {
            d.devnode() == path || d.mountpoint().to_string_lossy() == path
        })
    }

    pub fn find_mut(&mut self, path: &str) -> Option<&mut Device> {
        self.slots.iter_mut().flatten().find(|d| {
            d.devnode() == path || d.mountpoint().to_string_lossy() == path
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.slots.iter().flatten()
    }

    /// Drains every devnode currently held, in slot order. Used by
    /// shutdown to unmount everything without holding a borrow of the
    /// registry across the unmount calls.
    pub fn devnodes(&self) -> Vec<String> {
        self.iter().map(|d| d.devnode().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceKind;

    fn fake_device(devnode: &str, mountpoint: &str) -> Device {
        Device::for_test(devnode, DeviceKind::Volume, mountpoint)
    }

    #[test]
    fn insert_then_find_by_either_path() {
        let mut registry = Registry::new(2);
        assert!(registry.insert(fake_device("/dev/sdb1", "/mnt/PHOTOS")));
        assert!(registry.find("/dev/sdb1").is_some());
        assert!(registry.find("/mnt/PHOTOS").is_some());
        assert!(registry.find("/dev/sdz9").is_none());
    }

    #[test]
    fn insert_fails_when_full() {
        let mut registry = Registry::new(1);
        assert!(registry.insert(fake_device("/dev/sdb1", "/mnt/a")));
        assert!(!registry.insert(fake_device("/dev/sdc1", "/mnt/b")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_frees_the_slot_for_reuse() {
        let mut registry = Registry::new(1);
        registry.insert(fake_device("/dev/sdb1", "/mnt/a"));
        assert!(registry.remove("/dev/sdb1").is_some());
        assert!(registry.insert(fake_device("/dev/sdc1", "/mnt/b")));
    }
}
