//! Public configuration surface for embedding (spec.md §6 "Configuration").
//!
//! All fields are enumerated; unknown/contradictory combinations must fail
//! at `Context::open_device` time rather than at first I/O.

use vnic_abi::{DeviceClass, Error, PfId, Result, VfId};

/// BAR lifecycle hooks a caller may register (spec.md §6 `bar_cbs`).
/// `validate` gates `DRIVER_OK` (spec.md §4.5 step 4); `start`/`stop` bracket
/// the controller's running window; `pre_flr`/`post_flr` bracket the FLR
/// reopen wait (spec.md §4.5 step 3).
pub struct BarCallbacks {
    pub validate: Option<Box<dyn Fn() -> bool + Send + Sync>>,
    pub start: Option<Box<dyn Fn() + Send + Sync>>,
    pub stop: Option<Box<dyn Fn() + Send + Sync>>,
    pub pre_flr: Option<Box<dyn Fn() + Send + Sync>>,
    pub post_flr: Option<Box<dyn Fn() + Send + Sync>>,
}

impl Default for BarCallbacks {
    fn default() -> Self {
        Self {
            validate: None,
            start: None,
            stop: None,
            pre_flr: None,
            post_flr: None,
        }
    }
}

/// Class-specific initial register values (spec.md §6
/// `initial_registers{...class-specific...}`).
#[derive(Clone, Debug, PartialEq)]
pub enum InitialRegisters {
    Block {
        capacity_sectors: u64,
        blk_size: u32,
        seg_max: u32,
    },
    Net {
        mac: [u8; 6],
        mtu: u16,
        max_vq_pairs: u16,
    },
    Fs {
        tag: [u8; 36],
        num_request_queues: u32,
    },
    Nvme {
        counter_set_id: u32,
    },
}

impl InitialRegisters {
    pub fn class(&self) -> DeviceClass {
        match self {
            InitialRegisters::Block { .. } => DeviceClass::Block,
            InitialRegisters::Net { .. } => DeviceClass::Net,
            InitialRegisters::Fs { .. } => DeviceClass::Fs,
            InitialRegisters::Nvme { .. } => DeviceClass::Nvme,
        }
    }
}

/// Configuration for opening one device (spec.md §6).
pub struct DeviceConfig {
    pub pf_id: PfId,
    pub vf_id: Option<VfId>,
    pub pci_type: DeviceClass,
    pub bar_cbs: BarCallbacks,
    /// Number of polling groups.
    pub npgs: u32,
    pub event_channel: bool,
    pub suspended_on_open: bool,
    pub recover_on_open: bool,
    pub force_recover: bool,
    pub vf_dynamic_msix: bool,
    pub force_in_order: bool,
    pub max_queues: u16,
    pub max_tunnel_desc: u16,
    pub initial_registers: InitialRegisters,
    /// For hotplug PF slots only.
    pub max_vfs: u32,
}

impl DeviceConfig {
    /// Validate the combination eagerly, per spec.md §6: "unknown
    /// combinations must fail at open time rather than at first I/O."
    pub fn validate(&self) -> Result<()> {
        if self.npgs == 0 {
            return Err(Error::BadArgument("npgs must be at least 1".into()));
        }
        if self.max_queues == 0 {
            return Err(Error::BadArgument("max_queues must be at least 1".into()));
        }
        if self.pci_type != self.initial_registers.class() {
            return Err(Error::BadArgument(format!(
                "pci_type {:?} does not match initial_registers class {:?}",
                self.pci_type,
                self.initial_registers.class()
            )));
        }
        if self.vf_id.is_some() && self.max_vfs != 0 {
            return Err(Error::BadArgument(
                "a VF device cannot itself declare max_vfs (hotplug is a PF-only concept)".into(),
            ));
        }
        if self.force_recover && !self.recover_on_open {
            return Err(Error::BadArgument(
                "force_recover requires recover_on_open".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod config_tests;
