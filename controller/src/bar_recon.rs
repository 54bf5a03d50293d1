//! BAR reconciliation (spec.md §4.5 "BAR reconciliation (on every progress
//! tick)"). The diff-and-decide step is kept as a pure function so it can be
//! unit-tested without a full [`crate::Controller`]; [`crate::Controller::ctrl_progress`]
//! is what actually executes the chosen [`ReconcileAction`].

use vnic_device::BarShadow;

/// What the controller should do this tick, decided by diffing `bar_curr`
/// against `bar_prev` (spec.md §4.5 steps 2-5, evaluated in this priority
/// order — first match wins).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Step 2: `reset` bit set.
    Reset,
    /// Step 3: `enabled` bit just cleared — function-level reset.
    Flr,
    /// Step 4: `DRIVER_OK` just set.
    Start,
    /// Step 5: `num_vfs` changed from `bar_prev`.
    RescanVfs { num_vfs: u32 },
    /// Nothing changed that the controller needs to act on.
    None,
}

/// Decide the reconciliation action for one tick. Mirrors the `if/else if`
/// chain of spec.md §4.5 exactly: only the first matching condition fires.
pub fn decide(bar_prev: &BarShadow, bar_curr: &BarShadow) -> ReconcileAction {
    if bar_curr.reset {
        return ReconcileAction::Reset;
    }
    if !bar_curr.enabled {
        return ReconcileAction::Flr;
    }
    let driver_ok_just_set = bar_curr.device_status & vnic_abi::constants::VIRTIO_STATUS_DRIVER_OK != 0
        && bar_prev.device_status & vnic_abi::constants::VIRTIO_STATUS_DRIVER_OK == 0;
    if driver_ok_just_set {
        return ReconcileAction::Start;
    }
    if bar_curr.num_vfs != bar_prev.num_vfs {
        return ReconcileAction::RescanVfs {
            num_vfs: bar_curr.num_vfs,
        };
    }
    ReconcileAction::None
}
