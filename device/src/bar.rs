//! BAR shadow register image (spec.md §3 "BAR shadow", §4.3).
//!
//! The host-visible PCI/virtio register layouts themselves are adopted by
//! reference from the public specs (spec.md §1 Non-goals); this module only
//! models the fields the controller must read and branch on, plus the
//! per-field modifiable mask that gates writes.

use bitflags::bitflags;

use vnic_abi::Error;

bitflags! {
    /// Which BAR fields a `modify_device` call is allowed to touch. Re-queried
    /// lazily on first use (spec.md §4.3) and cached on the owning [`crate::Device`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ModifiableMask: u32 {
        const STATUS            = 1 << 0;
        const FEATURE_SELECT     = 1 << 1;
        const DEVICE_FEATURES    = 1 << 2;
        const MSIX_CONFIG        = 1 << 3;
        const QUEUE_SELECT       = 1 << 4;
        const QUEUE_SIZE         = 1 << 5;
        const QUEUE_ENABLE       = 1 << 6;
        const QUEUE_MSIX_VECTOR  = 1 << 7;
        const QUEUE_DESC         = 1 << 8;
        const QUEUE_DRIVER       = 1 << 9;
        const QUEUE_DEVICE       = 1 << 10;
        const DEVICE_CONFIG      = 1 << 11;
        const PCI_COMMON_CONFIG  = 1 << 12;
    }
}

impl ModifiableMask {
    /// `mask = ALL` overrides status and pci-common-config (spec.md §4.3).
    pub const ALL: ModifiableMask = ModifiableMask::all();
}

/// Per-queue shadow state (spec.md §3 "per-queue rings").
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueRingState {
    pub size: u16,
    pub msix_vector: u16,
    pub enable: bool,
    pub notify_off: u16,
    pub desc: u64,
    pub driver: u64,
    pub device: u64,
    pub hw_avail_idx: u16,
    pub hw_used_idx: u16,
}

/// Full BAR register image (spec.md §3 "BAR shadow").
///
/// A `Device` keeps one "current" and one "previous" copy so that the
/// controller's reconciliation pass (spec.md §4.5) can diff them field by
/// field on every progress tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BarShadow {
    pub device_feature_select: u32,
    pub device_features: u64,
    pub driver_feature_select: u32,
    pub driver_features: u64,
    pub msix_config: u16,
    pub num_queues: u16,
    pub device_status: u8,
    pub config_generation: u8,
    pub reset: bool,
    pub enabled: bool,
    pub num_vfs: u32,
    pub queue_select: u16,
    pub queues: Vec<QueueRingState>,
    /// Class-specific config block, bit-exact with the host BAR
    /// (spec.md §6 "DEVICE_CFG").
    pub device_config: Vec<u8>,
}

impl BarShadow {
    pub fn new(max_queues: u16) -> Self {
        Self {
            num_queues: max_queues,
            queues: vec![QueueRingState::default(); max_queues as usize],
            ..Default::default()
        }
    }

    /// Validate a proposed write against `mask` (spec.md §8 "For every
    /// modify-device call: bits set in `mask` outside the device's reported
    /// modifiable-field mask cause the call to fail with `BadArgument`
    /// before any firmware command is issued").
    pub fn check_write_allowed(
        requested: ModifiableMask,
        allowed: ModifiableMask,
    ) -> Result<(), Error> {
        let disallowed = requested & !allowed;
        if !disallowed.is_empty() {
            return Err(Error::BadArgument(format!(
                "modify requested bits outside modifiable mask: {disallowed:?}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod bar_tests;
