use super::*;

#[test]
fn new_bar_allocates_one_ring_state_per_queue() {
    let bar = BarShadow::new(4);
    assert_eq!(bar.queues.len(), 4);
    assert!(bar.queues.iter().all(|q| !q.enable));
}

#[test]
fn write_within_mask_is_allowed() {
    let allowed = ModifiableMask::QUEUE_ENABLE | ModifiableMask::QUEUE_SIZE;
    assert!(BarShadow::check_write_allowed(ModifiableMask::QUEUE_ENABLE, allowed).is_ok());
}

#[test]
fn write_outside_mask_is_rejected() {
    let allowed = ModifiableMask::QUEUE_ENABLE;
    let requested = ModifiableMask::QUEUE_ENABLE | ModifiableMask::DEVICE_CONFIG;
    assert!(BarShadow::check_write_allowed(requested, allowed).is_err());
}

#[test]
fn all_mask_overrides_status_and_common_config() {
    assert!(ModifiableMask::ALL.contains(ModifiableMask::STATUS));
    assert!(ModifiableMask::ALL.contains(ModifiableMask::PCI_COMMON_CONFIG));
}
