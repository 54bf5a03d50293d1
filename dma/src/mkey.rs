//! Cross memory key (spec.md §3, §4.2 "Cross memory key").

use std::sync::Arc;

use vnic_abi::VhcaId;

use crate::keys::RKey;

struct CrossMkeyInner {
    rkey: RKey,
    vhca_id: VhcaId,
}

/// Bridges the controller's protection domain and an emulated function's
/// host address space. Reference-counted (spec.md §3 "Ownership"): queues
/// hold a shared handle, the owning device holds the original. Must be
/// destroyed before the device it targets; in this crate that ordering is
/// advisory (documented in `DESIGN.md`) rather than enforced, since the
/// actual destroy command needs the device's tunnel and cannot run from an
/// arbitrary `Drop` context.
#[derive(Clone)]
pub struct CrossMkey(Arc<CrossMkeyInner>);

impl CrossMkey {
    pub fn new(rkey: RKey, vhca_id: VhcaId) -> Self {
        Self(Arc::new(CrossMkeyInner { rkey, vhca_id }))
    }

    pub fn rkey(&self) -> RKey {
        self.0.rkey
    }

    pub fn vhca_id(&self) -> VhcaId {
        self.0.vhca_id
    }

    /// Number of live handles (this one plus every clone). Used by tests to
    /// assert a queue's clone is dropped before its owning device.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

#[cfg(test)]
mod mkey_tests {
    use super::*;

    #[test]
    fn clones_share_identity_and_bump_refcount() {
        let mkey = CrossMkey::new(RKey(9), VhcaId(4));
        assert_eq!(mkey.strong_count(), 1);
        let clone = mkey.clone();
        assert_eq!(mkey.strong_count(), 2);
        assert_eq!(clone.rkey(), RKey(9));
        drop(clone);
        assert_eq!(mkey.strong_count(), 1);
    }
}
