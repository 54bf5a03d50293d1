//! Shared identifiers, error types, and wire constants for the device-emulation
//! control plane.
//!
//! This crate has no behaviour of its own; it exists so that the command
//! channel, DMA, device, virtqueue, and controller layers agree on one
//! vocabulary of identifiers and one error type instead of each rolling its
//! own.

pub mod class;
pub mod constants;
pub mod error;
pub mod ids;

pub use class::DeviceClass;
pub use error::{Error, Result};
pub use ids::{Bdf, PfId, VfId, VhcaId, Vuid};
