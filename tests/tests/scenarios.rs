//! End-to-end coverage of spec.md §8's scenarios, driven entirely through
//! the public API each crate exports — the way a driver or VMM integration
//! outside this workspace would use the stack.

use std::sync::{Arc, Mutex};

use vnic_abi::constants::{
    ADMIN_CLASS_MIG_CTRL, ADMIN_CMD_GET_STATUS, ADMIN_STATUS_OK, VIRTIO_STATUS_ACKNOWLEDGE,
    VIRTIO_STATUS_DRIVER, VIRTIO_STATUS_DRIVER_OK, VIRTIO_STATUS_FEATURES_OK,
};
use vnic_abi::{Bdf, DeviceClass, Error, PfId, VhcaId, Vuid};
use vnic_cmdchan::test_fixtures::FakeChannel;
use vnic_cmdchan::{CommandChannel, Opcode};
use vnic_controller::{Controller, ControllerState, DirtyTrackKind, LmState, MigCtrlProcessor, ProviderKind};
use vnic_device::{
    BarCallbacks, BarShadow, Capabilities, Context, DeviceConfig, InitialRegisters, PfSlot,
};
use vnic_dma::{CrossMkey, DmaQueue, DmaQueueConfig, LKey, RKey, SimHostMemory};
use vnic_vqueue::{
    AdminCommandHeader, AdminCommandProcessor, AdminQueue, DescriptorEntry, Virtqueue,
};

fn capabilities() -> Capabilities {
    Capabilities {
        classes: vec![DeviceClass::Net],
        supports_cross_mkey: true,
        supports_hash_dirty_tracking: true,
        supports_bytemap_dirty_tracking: true,
        max_hotplug_pfs: 0,
    }
}

fn slot() -> PfSlot {
    PfSlot {
        class: DeviceClass::Net,
        pf_id: PfId(0),
        bdf: Bdf::new(0x18, 0, 0),
        vhca_id: VhcaId(9),
        vuid: Vuid(9),
        hotplugged: false,
        max_vfs: 0,
        num_vfs: 0,
        bar_shadow: BarShadow::new(2),
        hotplug_object: None,
    }
}

fn config() -> DeviceConfig {
    DeviceConfig {
        pf_id: PfId(0),
        vf_id: None,
        pci_type: DeviceClass::Net,
        bar_cbs: BarCallbacks::default(),
        npgs: 1,
        event_channel: false,
        suspended_on_open: false,
        recover_on_open: false,
        force_recover: false,
        vf_dynamic_msix: false,
        force_in_order: false,
        max_queues: 2,
        max_tunnel_desc: 8,
        initial_registers: InitialRegisters::Net {
            mac: [0, 0, 0, 0, 0, 1],
            mtu: 1500,
            max_vq_pairs: 1,
        },
        max_vfs: 0,
    }
}

fn open_controller() -> (Controller, Arc<FakeChannel>, Arc<SimHostMemory>, Context) {
    let context = Context::open(capabilities(), vec![slot()]);
    let channel = Arc::new(FakeChannel::new());
    let host_mem = Arc::new(SimHostMemory::new(1 << 20));
    let ctrl = Controller::open(
        &context,
        channel.clone() as Arc<dyn CommandChannel>,
        host_mem.clone(),
        ProviderKind::Software,
        config(),
    )
    .unwrap();
    (ctrl, channel, host_mem, context)
}

fn driver_negotiated_bar(ctrl: &Controller) -> BarShadow {
    let mut bar = ctrl.bar().clone();
    bar.enabled = true;
    for ring in bar.queues.iter_mut() {
        ring.size = 64;
        ring.enable = true;
    }
    bar.device_status =
        VIRTIO_STATUS_ACKNOWLEDGE | VIRTIO_STATUS_DRIVER | VIRTIO_STATUS_FEATURES_OK | VIRTIO_STATUS_DRIVER_OK;
    bar
}

/// spec.md §8 scenario 1: host negotiates virtio-net, one reconciliation
/// tick brings both queues up in the single configured polling group.
#[test]
fn cold_bringup_creates_queues_and_reaches_started() {
    let (mut ctrl, _ch, _mem, context) = open_controller();
    let bar = driver_negotiated_bar(&ctrl);
    ctrl.modify_bar(vnic_device::ModifiableMask::ALL, &bar).unwrap();

    ctrl.ctrl_progress(&context).unwrap();

    assert_eq!(ctrl.state(), ControllerState::Started);
    assert_eq!(ctrl.polling_groups().group(0).unwrap().queue_indices(), vec![0, 1]);
}

/// spec.md §8 scenario 4: quiesce, freeze, save, and restore into a fresh
/// controller reaches the same live queue set.
#[test]
fn live_migration_save_restore_round_trip() {
    let (mut src, _ch, _mem, context) = open_controller();
    let bar = driver_negotiated_bar(&src);
    src.modify_bar(vnic_device::ModifiableMask::ALL, &bar).unwrap();
    src.ctrl_progress(&context).unwrap();
    assert_eq!(src.state(), ControllerState::Started);

    src.quiesce().unwrap();
    assert_eq!(src.state(), ControllerState::Suspending);
    src.io_progress(0);
    src.ctrl_progress(&context).unwrap();
    assert_eq!(src.state(), ControllerState::Suspended);
    assert_eq!(src.lm_state(), LmState::Quiesced);

    src.freeze().unwrap();
    assert_eq!(src.lm_state(), LmState::Freezed);

    let size = src.state_size().unwrap();
    let mut buf = vec![0u8; size];
    assert_eq!(src.state_save(&mut buf).unwrap(), size);

    src.unfreeze().unwrap();
    src.unquiesce().unwrap();
    src.stop().unwrap();

    let (mut dst, _ch2, _mem2, _context2) = open_controller();
    dst.state_restore(&buf).unwrap();
    assert_eq!(dst.lm_state(), LmState::Quiesced);
    dst.start().unwrap();
    assert_eq!(dst.polling_groups().group(0).unwrap().queue_indices(), vec![0, 1]);
    dst.unquiesce().unwrap();
    assert_eq!(dst.lm_state(), LmState::Running);
}

/// spec.md §8 scenario 5: an admin GET_STATUS command, fetched and
/// dispatched through the real admin virtqueue, reports the controller's
/// live-migration state.
#[test]
fn admin_get_status_round_trips_through_admin_queue() {
    let (ctrl, _ch, _mem, _context) = open_controller();
    let ctrl = Arc::new(Mutex::new(ctrl));
    let processor = MigCtrlProcessor::new(ctrl.clone());

    let admin_mem = Arc::new(SimHostMemory::new(8192));
    admin_mem.register_rkey(RKey(1));
    let dma_queue = DmaQueue::new(DmaQueueConfig::default(), admin_mem.clone());
    let cross_mkey = CrossMkey::new(RKey(1), VhcaId(1));
    let vq = Virtqueue::new(0, 4, 8, false, dma_queue, cross_mkey);
    let mut aq = AdminQueue::new(vq, LKey(1));

    let mut request = Vec::new();
    request.extend_from_slice(
        &AdminCommandHeader {
            class: ADMIN_CLASS_MIG_CTRL,
            command: ADMIN_CMD_GET_STATUS,
        }
        .encode(),
    );
    request.extend_from_slice(&1u32.to_le_bytes());
    admin_mem.poke(0x1000, &request);

    let head = vec![
        DescriptorEntry { addr: 0x1000, len: request.len() as u32, flags: vnic_abi::constants::VIRTQ_DESC_F_NEXT, next: 1 },
        DescriptorEntry { addr: 0x2000, len: 2, flags: vnic_abi::constants::VIRTQ_DESC_F_WRITE, next: 0 },
    ];
    let cmd_id = aq.inner_mut().fetch_command(0, head, |_| None).unwrap();
    aq.process_command(cmd_id, &processor).unwrap();

    let response = admin_mem.peek(0x2000, 2);
    assert_eq!(response[0], LmState::Init as u8);
    assert_eq!(response[1], ADMIN_STATUS_OK);
}

/// spec.md §8 scenario 6: dirty-page tracking reports a monotonically
/// growing set as pages are touched.
#[test]
fn dirty_page_tracking_reports_touched_pages() {
    let (mut ctrl, _ch, _mem, _context) = open_controller();
    ctrl.start_dirty_pages_track(DirtyTrackKind::HashSet { page_size: 0x1000 })
        .unwrap();
    ctrl.mark_dirty(0x4000, 1);
    ctrl.mark_dirty(0x5000, 1);
    assert_eq!(ctrl.dirty_pages_get_size(), Some(16));
    ctrl.stop_dirty_pages_track();
    assert_eq!(ctrl.dirty_pages_get_size(), None);
}

/// spec.md §8 scenario 3: FLR whose reopen keeps failing kills the
/// controller permanently after the bounded reopen wait, without blocking
/// more than one tick per `ctrl_progress` call.
#[test]
fn flr_reopen_exhaustion_kills_the_controller() {
    let (mut ctrl, channel, _mem, context) = open_controller();
    let bar = driver_negotiated_bar(&ctrl);
    ctrl.modify_bar(vnic_device::ModifiableMask::ALL, &bar).unwrap();
    ctrl.ctrl_progress(&context).unwrap();
    assert_eq!(ctrl.state(), ControllerState::Started);

    channel.fail_opcode(Opcode::CreateGeneralObject, Error::Busy);
    let mut bar = ctrl.bar().clone();
    bar.enabled = false;
    ctrl.modify_bar(vnic_device::ModifiableMask::ALL, &bar).unwrap();
    ctrl.ctrl_progress(&context).unwrap(); // observes FLR, begins the reopen wait

    let mut last = Ok(());
    for _ in 0..101 {
        last = ctrl.ctrl_progress(&context);
        if ctrl.is_dead() {
            break;
        }
    }
    assert!(ctrl.is_dead());
    assert!(last.is_err());
}
