//! Lifecycle events broadcast to listeners

use serde::Serialize;

use crate::engine::AttributionState;
use crate::store::ReferralIdentity;

/// Capacity of the lifecycle broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Events emitted while the agent initializes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// The attribution state machine moved
    StateChanged { state: AttributionState },
    /// A referral identity became active for this page load
    Attributed { identity: ReferralIdentity },
    /// Initialization finished; the agent dispatches directly from now on
    Ready { attributed: bool, landing_page: bool },
    /// Initialization stopped for good
    Halted { reason: String },
}

impl AgentEvent {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_event_serializes_with_tag() {
        let event = AgentEvent::Ready {
            attributed: true,
            landing_page: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ready");
        assert_eq!(json["attributed"], true);
        assert!(event.is_ready());
    }

    #[test]
    fn state_change_serializes_state() {
        let event = AgentEvent::StateChanged {
            state: AttributionState::Resolving,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["state"], "resolving");
        assert!(!event.is_ready());
    }
}
