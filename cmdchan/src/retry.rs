//! Per-opcode retry policy (spec.md §4.1, §5).
//!
//! Tunneled commands retry with a fixed 50ms backoff, up to an opcode-specific
//! number of attempts. This is data, not control flow, so the channel's retry
//! loop stays identical for every opcode.

use std::time::Duration;

use crate::opcode::Opcode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

const BACKOFF: Duration = Duration::from_millis(50);

impl RetryPolicy {
    pub const NONE: RetryPolicy = RetryPolicy {
        max_retries: 0,
        backoff: BACKOFF,
    };

    /// Retry policy for a given opcode, per spec.md §4.1: 100 retries for
    /// `enable_hca`/`init_hca`, 5 for `disable_hca`/`teardown_hca`, 0 for
    /// most object operations.
    pub fn for_opcode(opcode: Opcode) -> RetryPolicy {
        match opcode {
            Opcode::EnableHca | Opcode::InitHca => RetryPolicy {
                max_retries: 100,
                backoff: BACKOFF,
            },
            Opcode::DisableHca | Opcode::TeardownHca => RetryPolicy {
                max_retries: 5,
                backoff: BACKOFF,
            },
            _ => RetryPolicy::NONE,
        }
    }
}

#[cfg(test)]
mod retry_tests;
