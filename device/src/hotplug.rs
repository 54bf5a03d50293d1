//! Dynamic PF hotplug (spec.md §4.3 "Hotplug").

use vnic_abi::{Bdf, DeviceClass, Error, PfId, Result, VhcaId, Vuid};
use vnic_cmdchan::{object_create, object_destroy, CommandChannel, ObjectType};

use crate::bar::BarShadow;
use crate::pfslot::{Context, PfSlot};

#[cfg(test)]
use crate::pfslot::Capabilities;

/// Hotplug-state bits scanned during hotunplug cleanup (spec.md §4.3:
/// "cleanup scans PFs for `POWER_OFF` or `HOTUNPLUG_PREPARE`").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HotplugState {
    Active,
    HotunplugPrepare,
    PowerOff,
}

/// Initial register values supplied to `hotplug_pf`, plus the "use defaults"
/// escape hatch spec.md §4.3 calls out ("optional default flag").
pub struct HotplugRegs {
    pub use_defaults: bool,
    pub max_queues: u16,
}

/// Create a firmware hotplug-device object and return the newly allocated
/// PF slot (spec.md §4.3 `hotplug_pf(context, type, regs, pci_attr,
/// max_vfs)`).
pub fn hotplug_pf(
    channel: &dyn CommandChannel,
    context: &Context,
    class: DeviceClass,
    pf_id: PfId,
    bdf: Bdf,
    regs: HotplugRegs,
    max_vfs: u32,
) -> Result<PfSlot> {
    if !context.capabilities().supports_class(class) {
        return Err(Error::NotSupported(format!(
            "{class} not supported by this context"
        )));
    }
    let input = vec![0u8; 32];
    let mut output = vec![0u8; 32];
    let object_id = pf_id.0;
    let handle = object_create(
        channel,
        None,
        false,
        ObjectType::VirtioBlkDeviceEmulation,
        &input,
        &mut output,
        object_id,
        |_resp| Vec::new(),
    )?;

    let slot = PfSlot {
        class,
        pf_id,
        bdf,
        vhca_id: VhcaId(pf_id.0 as u16),
        vuid: Vuid(pf_id.0 as u64),
        hotplugged: true,
        max_vfs,
        num_vfs: 0,
        bar_shadow: BarShadow::new(regs.max_queues),
        hotplug_object: Some(handle),
    };
    context.insert_slot(slot.clone());
    log::info!(target: "vnic_device", "hotplugged PF {pf_id:?} class={class} bdf={bdf}");
    Ok(slot)
}

/// Tear down VFs, then the hotplug object itself (spec.md §4.3
/// `hotunplug_pf(pf)`).
pub fn hotunplug_pf(channel: &dyn CommandChannel, context: &Context, slot: &PfSlot) -> Result<()> {
    if slot.num_vfs > 0 {
        context.rescan_vfs(slot.class, slot.pf_id, 0)?;
    }
    if let Some(handle) = &slot.hotplug_object {
        object_destroy(channel, handle, false)?;
    }
    context.remove_slot(slot.class, slot.pf_id)?;
    log::info!(target: "vnic_device", "hotunplugged PF {:?}", slot.pf_id);
    Ok(())
}

/// Scan PF slots for ones in `HOTUNPLUG_PREPARE` or `POWER_OFF` state and
/// finalise their removal (spec.md §4.3).
pub fn scan_and_finalize_hotunplugs(
    channel: &dyn CommandChannel,
    context: &Context,
    class: DeviceClass,
    states: impl Fn(&PfSlot) -> HotplugState,
) -> Result<Vec<PfId>> {
    let mut finalized = Vec::new();
    for slot in context.slots_for_class(class) {
        match states(&slot) {
            HotplugState::HotunplugPrepare | HotplugState::PowerOff => {
                hotunplug_pf(channel, context, &slot)?;
                finalized.push(slot.pf_id);
            }
            HotplugState::Active => {}
        }
    }
    Ok(finalized)
}

#[cfg(test)]
mod hotplug_tests;
