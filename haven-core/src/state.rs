//! Agent lifecycle states.
//!
//! ```text
//! Installing ──→ Installed ──→ Activating ──→ Active
//!     │                            │  ↑          │
//!     └──────→ Failed ←────────────┘  └──────────┘ (re-activation)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::LifecycleError;

/// Lifecycle state of an agent instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    /// Static tier is being populated
    #[default]
    Installing,
    /// Installed and waiting to take over
    Installed,
    /// Stale generations are being evicted
    Activating,
    /// Serving requests
    Active,
    /// Install or activation failed; terminal
    Failed,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Installing => "installing",
            AgentState::Installed => "installed",
            AgentState::Activating => "activating",
            AgentState::Active => "active",
            AgentState::Failed => "failed",
        }
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(&self, next: AgentState) -> bool {
        matches!(
            (self, next),
            (AgentState::Installing, AgentState::Installed)
                | (AgentState::Installing, AgentState::Failed)
                | (AgentState::Installed, AgentState::Activating)
                | (AgentState::Activating, AgentState::Active)
                | (AgentState::Activating, AgentState::Failed)
                | (AgentState::Active, AgentState::Activating)
        )
    }

    /// Validate and return the next state.
    pub fn transition(self, next: AgentState) -> Result<AgentState, LifecycleError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(LifecycleError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Failed)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentState {
    type Err = AgentStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "installing" => Ok(AgentState::Installing),
            "installed" => Ok(AgentState::Installed),
            "activating" => Ok(AgentState::Activating),
            "active" => Ok(AgentState::Active),
            "failed" => Ok(AgentState::Failed),
            _ => Err(AgentStateParseError(s.to_string())),
        }
    }
}

/// Error when parsing an invalid agent state string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentStateParseError(pub String);

impl fmt::Display for AgentStateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid agent state: {}", self.0)
    }
}

impl std::error::Error for AgentStateParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [AgentState; 5] = [
        AgentState::Installing,
        AgentState::Installed,
        AgentState::Activating,
        AgentState::Active,
        AgentState::Failed,
    ];

    #[test]
    fn test_happy_path_transitions() {
        let state = AgentState::default();
        let state = state.transition(AgentState::Installed).unwrap();
        let state = state.transition(AgentState::Activating).unwrap();
        let state = state.transition(AgentState::Active).unwrap();
        assert_eq!(state, AgentState::Active);
    }

    #[test]
    fn test_reactivation_allowed() {
        assert!(AgentState::Active.can_transition_to(AgentState::Activating));
    }

    #[test]
    fn test_failed_is_terminal() {
        for next in ALL {
            assert!(!AgentState::Failed.can_transition_to(next));
        }
        assert!(AgentState::Failed.is_terminal());
    }

    #[test]
    fn test_failed_only_from_installing_or_activating() {
        for from in ALL {
            let allowed = from.can_transition_to(AgentState::Failed);
            let expected = matches!(from, AgentState::Installing | AgentState::Activating);
            assert_eq!(allowed, expected, "from {}", from);
        }
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = AgentState::Installing
            .transition(AgentState::Active)
            .unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidTransition {
                from: AgentState::Installing,
                to: AgentState::Active,
            }
        );
    }

    #[test]
    fn test_state_string_roundtrip() {
        for state in ALL {
            assert_eq!(state.as_str().parse::<AgentState>().unwrap(), state);
        }
        assert!("sleeping".parse::<AgentState>().is_err());
    }
}
