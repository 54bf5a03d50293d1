//! Unified error type for the control plane.
//!
//! Mirrors the error kinds enumerated in spec.md §7. Every public operation
//! across the five layers returns [`Result<T>`]; `to_errno` gives the
//! negative-errno mapping spec.md §6 documents for the eventual FFI boundary,
//! it is not the shape application code is expected to match on.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration rejected at entry (spec.md §6: "unknown combinations
    /// must fail at open time").
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// Capability missing on this silicon.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// FLR or channel-fatal; the device is gone until it reappears.
    #[error("no device")]
    NoDevice,

    /// Firmware syndrome non-zero, or a channel transport error.
    #[error("command channel failure (opcode {opcode:#06x}, syndrome {syndrome:#x})")]
    CommandChannelFailure { opcode: u16, syndrome: u32 },

    #[error("out of memory")]
    OutOfMemory,

    /// Retry-eligible.
    #[error("busy")]
    Busy,

    /// Operation invalid in the current state-machine position.
    #[error("state mismatch: expected {expected}, found {found}")]
    StateMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// DMA completion status was non-success.
    #[error("dma failure: {0}")]
    DmaFailure(String),

    /// Migration payload too small for the section it claims to hold.
    #[error("truncated: need at least {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    /// Per-command: this command cannot recover, but the queue remains
    /// usable and the command moves to `fatal_cmds`.
    #[error("fatal command failure: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Negative-errno mapping for the documented FFI boundary (spec.md §6).
    /// `Busy` and `Again`-shaped failures are retry-eligible; everything
    /// else is a hard failure from the caller's point of view.
    pub fn to_errno(&self) -> i32 {
        match self {
            Error::BadArgument(_) => -22,       // EINVAL
            Error::NotSupported(_) => -95,      // EOPNOTSUPP
            Error::NoDevice => -19,             // ENODEV
            Error::CommandChannelFailure { .. } => -5, // EIO
            Error::OutOfMemory => -12,          // ENOMEM
            Error::Busy => -16,                 // EBUSY
            Error::StateMismatch { .. } => -22,  // EINVAL
            Error::DmaFailure(_) => -5,         // EIO
            Error::Truncated { .. } => -22,      // EINVAL
            Error::Fatal(_) => -5,              // EIO
        }
    }

    /// True for errors a caller may legitimately retry (`BUSY`/`AGAIN` in
    /// spec.md §6's vocabulary).
    pub fn is_retry_eligible(&self) -> bool {
        matches!(self, Error::Busy)
    }
}
