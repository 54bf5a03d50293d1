//! Controller and live-migration state machines (spec.md §4.5).
//!
//! ```text
//! STOPPED ──start──▶ STARTED ──suspend──▶ SUSPENDING ──(all qs suspended)──▶ SUSPENDED
//!    ▲                   │                                                        │
//!    │                   │                                                        │
//!    └──stop─────────────┴─resume─────────────────────────────────────────────────┘
//! ```

use vnic_abi::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    Stopped,
    Started,
    Suspending,
    Suspended,
}

impl ControllerState {
    pub const fn as_str(self) -> &'static str {
        match self {
            ControllerState::Stopped => "STOPPED",
            ControllerState::Started => "STARTED",
            ControllerState::Suspending => "SUSPENDING",
            ControllerState::Suspended => "SUSPENDED",
        }
    }

    pub fn can_start(self) -> bool {
        matches!(self, ControllerState::Stopped)
    }

    pub fn can_suspend(self) -> bool {
        matches!(self, ControllerState::Started)
    }

    pub fn can_resume(self) -> bool {
        matches!(self, ControllerState::Suspended)
    }

    /// `stop` is legal from any running position (spec.md §4.5 diagram:
    /// `stop` arrows leave both STARTED and SUSPENDED).
    pub fn can_stop(self) -> bool {
        matches!(
            self,
            ControllerState::Started | ControllerState::Suspending | ControllerState::Suspended
        )
    }

    /// Inverse of `self as u8`, used to validate the `ctrl_state` byte a
    /// migration payload carries (spec.md §4.5 `state_restore`: "validates
    /// the embedded `ctrl_state` field").
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ControllerState::Stopped),
            1 => Ok(ControllerState::Started),
            2 => Ok(ControllerState::Suspending),
            3 => Ok(ControllerState::Suspended),
            other => Err(Error::BadArgument(format!(
                "unrecognised ctrl_state byte {other}"
            ))),
        }
    }
}

impl core::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live-migration substate machine (spec.md §4.5, GLOSSARY "Live-migration
/// state"). Orthogonal to [`ControllerState`]; only meaningful while the
/// controller is STARTED or SUSPENDED. `Init` is the implicit starting
/// point the glossary calls out, before a migration flow has begun.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LmState {
    Init,
    Running,
    Quiesced,
    Freezed,
}

impl LmState {
    pub const fn as_str(self) -> &'static str {
        match self {
            LmState::Init => "LM_INIT",
            LmState::Running => "LM_RUNNING",
            LmState::Quiesced => "LM_QUIESCED",
            LmState::Freezed => "LM_FREEZED",
        }
    }

    /// `freeze` is only legal from `QUIESCED` (spec.md §4.5).
    pub fn can_freeze(self) -> bool {
        matches!(self, LmState::Quiesced)
    }

    pub fn can_unfreeze(self) -> bool {
        matches!(self, LmState::Freezed)
    }

    /// Quiesce starts the `RUNNING -> QUIESCED` leg (the full quiesce
    /// operation is `suspend(); wait(SUSPENDED); LM_QUIESCED`, spec.md §4.5).
    pub fn can_quiesce(self) -> bool {
        matches!(self, LmState::Init | LmState::Running)
    }

    pub fn can_unquiesce(self) -> bool {
        matches!(self, LmState::Quiesced)
    }
}

impl core::fmt::Display for LmState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn require(condition: bool, expected: &'static str, found: ControllerState) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::StateMismatch {
            expected,
            found: found.as_str(),
        })
    }
}

#[cfg(test)]
mod state_tests {
    use super::*;

    #[test]
    fn start_only_legal_from_stopped() {
        assert!(ControllerState::Stopped.can_start());
        assert!(!ControllerState::Started.can_start());
        assert!(!ControllerState::Suspended.can_start());
    }

    #[test]
    fn freeze_only_legal_from_quiesced() {
        assert!(!LmState::Running.can_freeze());
        assert!(LmState::Quiesced.can_freeze());
        assert!(!LmState::Freezed.can_freeze());
    }

    #[test]
    fn from_u8_round_trips_every_discriminant() {
        for state in [
            ControllerState::Stopped,
            ControllerState::Started,
            ControllerState::Suspending,
            ControllerState::Suspended,
        ] {
            assert_eq!(ControllerState::from_u8(state as u8).unwrap(), state);
        }
        assert!(ControllerState::from_u8(4).is_err());
    }

    #[test]
    fn stop_legal_from_started_suspending_and_suspended() {
        assert!(ControllerState::Started.can_stop());
        assert!(ControllerState::Suspending.can_stop());
        assert!(ControllerState::Suspended.can_stop());
        assert!(!ControllerState::Stopped.can_stop());
    }
}
