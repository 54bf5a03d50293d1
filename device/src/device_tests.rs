use vnic_abi::{Bdf, DeviceClass, PfId, VhcaId, Vuid};
use vnic_cmdchan::test_fixtures::FakeChannel;
use vnic_cmdchan::Opcode;

use super::*;
use crate::bar::BarShadow;
use crate::pfslot::PfSlot;

fn slot() -> PfSlot {
    PfSlot {
        class: DeviceClass::Block,
        pf_id: PfId(0),
        bdf: Bdf::new(0x17, 0, 0),
        vhca_id: VhcaId(5),
        vuid: Vuid(5),
        hotplugged: false,
        max_vfs: 0,
        num_vfs: 0,
        bar_shadow: BarShadow::new(2),
        hotplug_object: None,
    }
}

#[test]
fn init_device_creates_object_and_advances_state() {
    let ch = FakeChannel::new();
    let mut device = Device::new(slot(), None);
    device.state = DeviceState::Opened;
    let ops = StandardClassOps;
    ops.init_device(&ch, &mut device).unwrap();
    assert_eq!(device.state, DeviceState::Initialized);
    assert!(device.object_handle.is_some());
}

#[test]
fn init_device_from_wrong_state_fails() {
    let ch = FakeChannel::new();
    let mut device = Device::new(slot(), None);
    let ops = StandardClassOps;
    assert!(ops.init_device(&ch, &mut device).is_err());
}

#[test]
fn init_device_on_tunneled_function_toggles_enable_and_init_hca() {
    let ch = FakeChannel::new();
    let mut device = Device::new(slot(), Some(VhcaId(9)));
    device.state = DeviceState::Opened;
    let ops = StandardClassOps;
    ops.init_device(&ch, &mut device).unwrap();
    assert_eq!(ch.call_count(Opcode::EnableHca), 1);
    assert_eq!(ch.call_count(Opcode::InitHca), 1);
    let calls = ch.calls.lock().unwrap();
    let enable_idx = calls.iter().position(|(o, _)| *o == Opcode::EnableHca).unwrap();
    let init_idx = calls.iter().position(|(o, _)| *o == Opcode::InitHca).unwrap();
    let create_idx = calls
        .iter()
        .position(|(o, _)| *o == Opcode::CreateGeneralObject)
        .unwrap();
    assert!(enable_idx < init_idx && init_idx < create_idx);
}

#[test]
fn init_device_without_tunnel_never_toggles_hca() {
    let ch = FakeChannel::new();
    let mut device = Device::new(slot(), None);
    device.state = DeviceState::Opened;
    let ops = StandardClassOps;
    ops.init_device(&ch, &mut device).unwrap();
    assert_eq!(ch.call_count(Opcode::EnableHca), 0);
    assert_eq!(ch.call_count(Opcode::InitHca), 0);
}

#[test]
fn teardown_device_on_tunneled_function_toggles_teardown_and_disable_hca() {
    let ch = FakeChannel::new();
    let mut device = Device::new(slot(), Some(VhcaId(9)));
    device.state = DeviceState::Opened;
    let ops = StandardClassOps;
    ops.init_device(&ch, &mut device).unwrap();
    ops.teardown_device(&ch, &mut device).unwrap();
    assert_eq!(ch.call_count(Opcode::TeardownHca), 1);
    assert_eq!(ch.call_count(Opcode::DisableHca), 1);
    let calls = ch.calls.lock().unwrap();
    let destroy_idx = calls
        .iter()
        .position(|(o, _)| *o == Opcode::DestroyGeneralObject)
        .unwrap();
    let teardown_idx = calls.iter().position(|(o, _)| *o == Opcode::TeardownHca).unwrap();
    let disable_idx = calls.iter().position(|(o, _)| *o == Opcode::DisableHca).unwrap();
    assert!(destroy_idx < teardown_idx && teardown_idx < disable_idx);
}

#[test]
fn teardown_device_destroys_object_and_steps_back_to_opened() {
    let ch = FakeChannel::new();
    let mut device = Device::new(slot(), None);
    device.state = DeviceState::Opened;
    let ops = StandardClassOps;
    ops.init_device(&ch, &mut device).unwrap();
    ops.teardown_device(&ch, &mut device).unwrap();
    assert_eq!(device.state, DeviceState::Opened);
    assert!(device.object_handle.is_none());
}

#[test]
fn modify_device_rejects_bits_outside_modifiable_mask() {
    let ch = FakeChannel::new();
    let mut device = Device::new(slot(), None);
    device.state = DeviceState::Opened;
    let ops = StandardClassOps;
    ops.init_device(&ch, &mut device).unwrap();
    device.set_cached_modifiable_mask(ModifiableMask::QUEUE_ENABLE);

    let requested = ModifiableMask::QUEUE_ENABLE | ModifiableMask::DEVICE_CONFIG;
    let attr = device.slot.bar_shadow.clone();
    let result = ops.modify_device(&ch, &mut device, requested, &attr);
    assert!(matches!(result, Err(Error::BadArgument(_))));
}

#[test]
fn modify_device_all_mask_bypasses_the_cached_mask() {
    let ch = FakeChannel::new();
    let mut device = Device::new(slot(), None);
    device.state = DeviceState::Opened;
    let ops = StandardClassOps;
    ops.init_device(&ch, &mut device).unwrap();
    device.set_cached_modifiable_mask(ModifiableMask::empty());

    let attr = device.slot.bar_shadow.clone();
    assert!(ops
        .modify_device(&ch, &mut device, ModifiableMask::ALL, &attr)
        .is_ok());
}

#[test]
fn open_then_close_round_trips_through_closed() {
    let mut device = Device::new(slot(), None);
    assert_eq!(device.state, DeviceState::Closed);
    device.open().unwrap();
    assert_eq!(device.state, DeviceState::Opened);
    device.close().unwrap();
    assert_eq!(device.state, DeviceState::Closed);
}

#[test]
fn open_twice_without_close_fails() {
    let mut device = Device::new(slot(), None);
    device.open().unwrap();
    assert!(matches!(device.open(), Err(Error::StateMismatch { .. })));
}

#[test]
fn close_before_teardown_fails() {
    let ch = FakeChannel::new();
    let mut device = Device::new(slot(), None);
    device.open().unwrap();
    StandardClassOps.init_device(&ch, &mut device).unwrap();
    assert!(matches!(device.close(), Err(Error::StateMismatch { .. })));
}

#[test]
fn device_event_maps_one_to_one_with_class() {
    assert_eq!(
        DeviceEvent::for_class(DeviceClass::Block),
        DeviceEvent::VirtioBlkDeviceChange
    );
    assert_eq!(
        DeviceEvent::for_class(DeviceClass::Nvme),
        DeviceEvent::NvmeDeviceChange
    );
}
