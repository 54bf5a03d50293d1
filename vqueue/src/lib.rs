//! Virtqueue layer (spec.md §4.4): the descriptor-chain engine, its
//! pluggable provider, and the specialised admin virtqueue used for
//! migration/dirty-tracking commands.

pub mod admin;
pub mod command;
pub mod descriptor;
pub mod provider;
pub mod virtqueue;

pub use admin::{AdminCommand, AdminCommandHeader, AdminCommandProcessor, AdminQueue};
pub use command::{chain_completion, Command, CommandOutcome};
pub use descriptor::{DescriptorEntry, DescriptorPool};
pub use provider::{
    DpaProvider, HardwareProvider, SoftwareProvider, VqCreateParams, VqModifyAttr, VqProvider,
    VqProviderState,
};
pub use virtqueue::{VqState, Virtqueue};
