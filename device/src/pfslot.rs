//! Context and PF slot table (spec.md §3 "Context", "PF slot").

use std::collections::HashMap;
use std::sync::Mutex;

use vnic_abi::{Bdf, DeviceClass, Error, PfId, Result, VhcaId, Vuid};
use vnic_cmdchan::ObjectHandle;

use crate::bar::BarShadow;

/// Capabilities the SmartNIC instance reports: which emulation classes,
/// counters, dirty-tracking modes, cross-mkey support, and hotplug limits
/// are available. Immutable for the [`Context`]'s lifetime (spec.md §3).
#[derive(Clone, Debug, Default)]
pub struct Capabilities {
    pub classes: Vec<DeviceClass>,
    pub supports_cross_mkey: bool,
    pub supports_hash_dirty_tracking: bool,
    pub supports_bytemap_dirty_tracking: bool,
    pub max_hotplug_pfs: u32,
}

impl Capabilities {
    pub fn supports_class(&self, class: DeviceClass) -> bool {
        self.classes.contains(&class)
    }
}

/// A single PF slot (spec.md §3 "PF slot"). `(pf_id, class)` uniquely
/// identifies a slot; `num_vfs` may only change through [`Context::rescan_vfs`].
#[derive(Clone, Debug)]
pub struct PfSlot {
    pub class: DeviceClass,
    pub pf_id: PfId,
    pub bdf: Bdf,
    pub vhca_id: VhcaId,
    pub vuid: Vuid,
    pub hotplugged: bool,
    pub max_vfs: u32,
    pub num_vfs: u32,
    pub bar_shadow: BarShadow,
    /// The firmware hotplug-device object backing this slot, present only
    /// for dynamically hotplugged PFs (spec.md §4.3 `hotplug_pf`). Carries
    /// the destructor-buffer bytes needed by `hotunplug_pf`.
    pub hotplug_object: Option<ObjectHandle>,
}

struct ContextInner {
    slots: Vec<PfSlot>,
}

/// Opaque handle for one SmartNIC instance (spec.md §3 "Context").
///
/// Holds the PF slot table behind a lock, matching spec.md §5's
/// "per-context locks protect the device list and the hotplug-PF list".
pub struct Context {
    capabilities: Capabilities,
    inner: Mutex<ContextInner>,
}

impl Context {
    /// Open at process start (spec.md §3 lifecycle). `initial_slots` models
    /// the statically-provisioned PFs discovered from firmware at boot;
    /// hotplugged slots are added later via [`crate::hotplug::hotplug_pf`].
    pub fn open(capabilities: Capabilities, initial_slots: Vec<PfSlot>) -> Self {
        Self {
            capabilities,
            inner: Mutex::new(ContextInner { slots: initial_slots }),
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Slots matching `class`, in allocation order.
    pub fn slots_for_class(&self, class: DeviceClass) -> Vec<PfSlot> {
        self.inner
            .lock()
            .unwrap()
            .slots
            .iter()
            .filter(|s| s.class == class)
            .cloned()
            .collect()
    }

    pub fn slot(&self, class: DeviceClass, pf_id: PfId) -> Result<PfSlot> {
        self.inner
            .lock()
            .unwrap()
            .slots
            .iter()
            .find(|s| s.class == class && s.pf_id == pf_id)
            .cloned()
            .ok_or(Error::NoDevice)
    }

    pub fn insert_slot(&self, slot: PfSlot) {
        self.inner.lock().unwrap().slots.push(slot);
    }

    pub fn remove_slot(&self, class: DeviceClass, pf_id: PfId) -> Result<PfSlot> {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner
            .slots
            .iter()
            .position(|s| s.class == class && s.pf_id == pf_id)
            .ok_or(Error::NoDevice)?;
        Ok(inner.slots.remove(idx))
    }

    /// Total slot count across all classes, used by the hotplug round-trip
    /// test (spec.md §8 "Hotplug round-trip").
    pub fn slot_count(&self) -> usize {
        self.inner.lock().unwrap().slots.len()
    }

    /// Rescan and update `num_vfs` for a slot (spec.md §3: "`num_vfs` may
    /// only change through rescan"; spec.md §4.5 step 5 "`rescan_vfs`").
    pub fn rescan_vfs(&self, class: DeviceClass, pf_id: PfId, num_vfs: u32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let slot = inner
            .slots
            .iter_mut()
            .find(|s| s.class == class && s.pf_id == pf_id)
            .ok_or(Error::NoDevice)?;
        if num_vfs > slot.max_vfs {
            return Err(Error::BadArgument(format!(
                "num_vfs {num_vfs} exceeds max_vfs {}",
                slot.max_vfs
            )));
        }
        slot.num_vfs = num_vfs;
        Ok(())
    }
}

#[cfg(test)]
mod pfslot_tests;
