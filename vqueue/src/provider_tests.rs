use vnic_cmdchan::test_fixtures::FakeChannel;

use super::*;

fn params() -> VqCreateParams {
    VqCreateParams {
        ring_size: 256,
        msix_vector: 3,
        desc_pa: 0x1000,
        driver_pa: 0x2000,
        device_pa: 0x3000,
    }
}

#[test]
fn hardware_provider_create_then_destroy_round_trips() {
    let channel = FakeChannel::new();
    let mut provider = HardwareProvider::new();
    provider.create(&channel, &params()).unwrap();
    assert!(provider.queue_object.is_some());
    assert!(provider.counters_object.is_some());
    provider.destroy(&channel).unwrap();
    assert!(provider.queue_object.is_none());
    assert!(provider.counters_object.is_none());
}

#[test]
fn hardware_provider_modify_updates_reported_state() {
    let mut provider = HardwareProvider::new();
    let channel = FakeChannel::new();
    provider
        .modify(
            &channel,
            &VqModifyAttr {
                msix_vector: None,
                hw_avail_idx: Some(7),
                hw_used_idx: Some(9),
            },
        )
        .unwrap();
    let state = provider.query().unwrap();
    assert_eq!(state.hw_avail_idx, 7);
    assert_eq!(state.hw_used_idx, 9);
}

#[test]
fn software_provider_tick_synthesizes_header_only_on_index_change() {
    let mut provider = SoftwareProvider::new();
    assert!(!provider.tick(0));
    assert!(provider.tick(1));
    assert_eq!(provider.query().unwrap().hw_avail_idx, 1);
}

#[test]
fn software_provider_create_and_destroy_are_no_ops() {
    let mut provider = SoftwareProvider::new();
    let channel = FakeChannel::new();
    provider.create(&channel, &params()).unwrap();
    provider.destroy(&channel).unwrap();
}

#[test]
fn dpa_provider_create_and_modify_are_not_supported() {
    let mut provider = DpaProvider::default();
    let channel = FakeChannel::new();
    assert!(matches!(
        provider.create(&channel, &params()),
        Err(Error::NotSupported(_))
    ));
    assert!(matches!(
        provider.modify(&channel, &VqModifyAttr::default()),
        Err(Error::NotSupported(_))
    ));
}
