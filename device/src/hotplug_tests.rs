use vnic_abi::Bdf;
use vnic_cmdchan::test_fixtures::FakeChannel;

use super::*;

#[test]
fn hotplug_round_trip_restores_slot_cardinality() {
    let ch = FakeChannel::new();
    let ctx = Context::open(
        Capabilities {
            classes: vec![DeviceClass::Block],
            ..Default::default()
        },
        Vec::new(),
    );
    let before = ctx.slot_count();

    let slot = hotplug_pf(
        &ch,
        &ctx,
        DeviceClass::Block,
        PfId(9),
        Bdf::new(0x18, 0, 0),
        HotplugRegs {
            use_defaults: true,
            max_queues: 2,
        },
        4,
    )
    .unwrap();
    assert_eq!(ctx.slot_count(), before + 1);
    assert!(slot.hotplugged);

    hotunplug_pf(&ch, &ctx, &slot).unwrap();
    assert_eq!(ctx.slot_count(), before);
}

#[test]
fn hotplug_on_unsupported_class_fails() {
    let ch = FakeChannel::new();
    let ctx = Context::open(Capabilities::default(), Vec::new());
    let result = hotplug_pf(
        &ch,
        &ctx,
        DeviceClass::Net,
        PfId(1),
        Bdf::new(0x19, 0, 0),
        HotplugRegs {
            use_defaults: true,
            max_queues: 2,
        },
        0,
    );
    assert!(matches!(result, Err(Error::NotSupported(_))));
}

#[test]
fn scan_finalizes_only_prepare_and_power_off_slots() {
    use std::sync::atomic::{AtomicU32, Ordering};

    let ch = FakeChannel::new();
    let ctx = Context::open(
        Capabilities {
            classes: vec![DeviceClass::Block],
            ..Default::default()
        },
        Vec::new(),
    );
    for i in 0..3u32 {
        hotplug_pf(
            &ch,
            &ctx,
            DeviceClass::Block,
            PfId(i),
            Bdf::new(0x20, 0, i as u8),
            HotplugRegs {
                use_defaults: true,
                max_queues: 1,
            },
            0,
        )
        .unwrap();
    }

    let calls = AtomicU32::new(0);
    let finalized = scan_and_finalize_hotunplugs(&ch, &ctx, DeviceClass::Block, |slot| {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        if slot.pf_id == PfId(1) {
            HotplugState::PowerOff
        } else {
            let _ = n;
            HotplugState::Active
        }
    })
    .unwrap();

    assert_eq!(finalized, vec![PfId(1)]);
    assert_eq!(ctx.slot_count(), 2);
}
