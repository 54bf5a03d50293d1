use super::*;

fn slot(pf_id: u32, class: DeviceClass) -> PfSlot {
    PfSlot {
        class,
        pf_id: PfId(pf_id),
        bdf: Bdf::new(0x17, 0, pf_id as u8),
        vhca_id: VhcaId(pf_id as u16),
        vuid: Vuid(pf_id as u64),
        hotplugged: false,
        max_vfs: 4,
        num_vfs: 0,
        bar_shadow: BarShadow::new(2),
        hotplug_object: None,
    }
}

#[test]
fn slots_for_class_filters_correctly() {
    let ctx = Context::open(
        Capabilities::default(),
        vec![slot(0, DeviceClass::Block), slot(0, DeviceClass::Net)],
    );
    assert_eq!(ctx.slots_for_class(DeviceClass::Block).len(), 1);
    assert_eq!(ctx.slots_for_class(DeviceClass::Net).len(), 1);
    assert_eq!(ctx.slots_for_class(DeviceClass::Fs).len(), 0);
}

#[test]
fn insert_then_remove_round_trips_slot_count() {
    let ctx = Context::open(Capabilities::default(), vec![slot(0, DeviceClass::Block)]);
    let before = ctx.slot_count();
    ctx.insert_slot(slot(1, DeviceClass::Block));
    assert_eq!(ctx.slot_count(), before + 1);
    ctx.remove_slot(DeviceClass::Block, PfId(1)).unwrap();
    assert_eq!(ctx.slot_count(), before);
}

#[test]
fn rescan_vfs_rejects_exceeding_max() {
    let ctx = Context::open(Capabilities::default(), vec![slot(0, DeviceClass::Block)]);
    assert!(ctx.rescan_vfs(DeviceClass::Block, PfId(0), 5).is_err());
    assert!(ctx.rescan_vfs(DeviceClass::Block, PfId(0), 3).is_ok());
    assert_eq!(ctx.slot(DeviceClass::Block, PfId(0)).unwrap().num_vfs, 3);
}
