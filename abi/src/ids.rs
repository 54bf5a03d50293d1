//! Identifier newtypes.
//!
//! These prevent mixing up a PCI BDF, a VHCA id, and a VUID, which are all
//! plain integers on the wire but mean very different things: a BDF names a
//! PCI topology slot, a `vhca_id` names a firmware-side function identity
//! that can change across hotplug, and a VUID is the stable identity that
//! survives it.

use core::fmt;

/// PCI bus/device/function address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bdf {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl Bdf {
    pub const fn new(bus: u8, device: u8, function: u8) -> Self {
        Self {
            bus,
            device,
            function,
        }
    }
}

impl fmt::Display for Bdf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus, self.device, self.function)
    }
}

/// Firmware-side virtual HCA identity. May change on hotplug reinit; do not
/// use as a stable key across device re-open, use [`Vuid`] for that.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VhcaId(pub u16);

/// Stable virtual function identity, survives hotplug and bdf renumbering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Vuid(pub u64);

/// Index of a physical function slot within a [`crate::DeviceClass`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PfId(pub u32);

/// Index of a virtual function within its parent PF.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VfId(pub u32);
