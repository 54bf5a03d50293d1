use super::*;

fn base_config() -> DeviceConfig {
    DeviceConfig {
        pf_id: PfId(0),
        vf_id: None,
        pci_type: DeviceClass::Block,
        bar_cbs: BarCallbacks::default(),
        npgs: 1,
        event_channel: false,
        suspended_on_open: false,
        recover_on_open: false,
        force_recover: false,
        vf_dynamic_msix: false,
        force_in_order: false,
        max_queues: 2,
        max_tunnel_desc: 62,
        initial_registers: InitialRegisters::Block {
            capacity_sectors: 1_048_576,
            blk_size: 512,
            seg_max: 62,
        },
        max_vfs: 0,
    }
}

#[test]
fn well_formed_config_validates() {
    assert!(base_config().validate().is_ok());
}

#[test]
fn zero_npgs_is_rejected() {
    let mut cfg = base_config();
    cfg.npgs = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn mismatched_class_and_initial_registers_is_rejected() {
    let mut cfg = base_config();
    cfg.pci_type = DeviceClass::Net;
    assert!(cfg.validate().is_err());
}

#[test]
fn vf_with_max_vfs_is_rejected() {
    let mut cfg = base_config();
    cfg.vf_id = Some(VfId(0));
    cfg.max_vfs = 4;
    assert!(cfg.validate().is_err());
}

#[test]
fn force_recover_without_recover_on_open_is_rejected() {
    let mut cfg = base_config();
    cfg.force_recover = true;
    assert!(cfg.validate().is_err());
}
