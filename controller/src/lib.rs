//! Controller layer (spec.md §4.5): the top-level state machine that owns a
//! device and its queues, reconciles BAR writes, and drives live migration
//! and dirty-page tracking.

pub mod bar_recon;
pub mod controller;
pub mod dirty;
pub mod migration;
pub mod polling;
pub mod state;

pub use bar_recon::ReconcileAction;
pub use controller::{Controller, DirtyTrackKind, MigCtrlProcessor, ProviderKind};
pub use dirty::{DirtyByteMap, DirtyPageHashSet, DirtyTracker};
pub use migration::{CommonCfg, ControllerSnapshot, QueueCfg};
pub use polling::{PollingGroup, PollingGroups};
pub use state::{ControllerState, LmState};
