//! Device object layer (spec.md §4.3): per-PF/VF state, BAR shadow,
//! per-class query/modify/init/teardown, and hotplug.

pub mod bar;
pub mod config;
pub mod device;
pub mod hotplug;
pub mod pfslot;

pub use bar::{BarShadow, ModifiableMask, QueueRingState};
pub use config::{BarCallbacks, DeviceConfig, InitialRegisters};
pub use device::{Device, DeviceAttr, DeviceClassOps, DeviceEvent, DeviceState, StandardClassOps};
pub use hotplug::{hotplug_pf, hotunplug_pf, scan_and_finalize_hotunplugs, HotplugRegs, HotplugState};
pub use pfslot::{Capabilities, Context, PfSlot};
