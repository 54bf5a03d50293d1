use super::*;

fn desc(flags: u16) -> DescriptorEntry {
    DescriptorEntry {
        addr: 0x1000,
        len: 16,
        flags,
        next: 0,
    }
}

#[test]
fn first_writable_is_the_boundary_between_request_and_response() {
    use vnic_abi::constants::{VIRTQ_DESC_F_NEXT, VIRTQ_DESC_F_WRITE};
    let cmd = Command::new(
        0,
        vec![
            desc(VIRTQ_DESC_F_NEXT),
            desc(VIRTQ_DESC_F_NEXT | VIRTQ_DESC_F_WRITE),
            desc(VIRTQ_DESC_F_WRITE),
        ],
    );
    assert_eq!(cmd.first_readable(), Some(0));
    assert_eq!(cmd.first_writable(), Some(1));
}

#[test]
fn chain_completion_marks_fatal_on_failure() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use vnic_dma::DmaStatus;

    let fatal = Arc::new(AtomicBool::new(false));
    let on_fatal = {
        let fatal = fatal.clone();
        move || fatal.store(true, Ordering::SeqCst)
    };
    let completion = chain_completion(1, on_fatal, |_ok| {});
    completion.charge(DmaStatus::Error("bad".into()));
    assert!(fatal.load(Ordering::SeqCst));
}

#[test]
fn chain_completion_leaves_fatal_false_on_success() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use vnic_dma::DmaStatus;

    let fatal = Arc::new(AtomicBool::new(false));
    let on_fatal = {
        let fatal = fatal.clone();
        move || fatal.store(true, Ordering::SeqCst)
    };
    let completion = chain_completion(1, on_fatal, |_ok| {});
    completion.charge(DmaStatus::Success);
    assert!(!fatal.load(Ordering::SeqCst));
}
