//! States of the attribution state machine

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where initialization currently stands.
///
/// `Uninitialized -> Resolving -> {Attributed, Unattributed} -> Ready`, or
/// `Uninitialized -> Halted` when the host provided no public id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionState {
    #[default]
    Uninitialized,
    Resolving,
    Attributed,
    Unattributed,
    Ready,
    /// Terminal: initialization was abandoned
    Halted,
}

impl AttributionState {
    /// No further transitions follow
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Halted)
    }

    /// Whether `next` is a legal successor
    pub fn can_transition_to(self, next: AttributionState) -> bool {
        use AttributionState::*;
        matches!(
            (self, next),
            (Uninitialized, Resolving)
                | (Uninitialized, Halted)
                | (Resolving, Attributed)
                | (Resolving, Unattributed)
                | (Attributed, Ready)
                | (Unattributed, Ready)
        )
    }
}

impl fmt::Display for AttributionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Resolving => write!(f, "resolving"),
            Self::Attributed => write!(f, "attributed"),
            Self::Unattributed => write!(f, "unattributed"),
            Self::Ready => write!(f, "ready"),
            Self::Halted => write!(f, "halted"),
        }
    }
}
