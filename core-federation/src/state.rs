//! Peer lifecycle
//!
//! `Unknown -> Validating -> Registered -> {Enabled, Disabled}`. A failed
//! validation falls back to `Unknown`; stored peers move between `Enabled`
//! and `Disabled`.

use crate::error::{FederationError, Result};
use core_library::models::NodeInfo;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Unknown,
    Validating,
    Registered,
    Enabled,
    Disabled,
}

impl NodeState {
    pub fn of(node: &NodeInfo) -> Self {
        if node.is_enabled {
            NodeState::Enabled
        } else {
            NodeState::Disabled
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Unknown => "Unknown",
            NodeState::Validating => "Validating",
            NodeState::Registered => "Registered",
            NodeState::Enabled => "Enabled",
            NodeState::Disabled => "Disabled",
        }
    }

    /// Checks whether moving to `to` is allowed
    pub fn validate_transition(&self, to: NodeState) -> Result<()> {
        let valid = matches!(
            (self, to),
            (NodeState::Unknown, NodeState::Validating)
                | (NodeState::Validating, NodeState::Registered)
                | (NodeState::Validating, NodeState::Unknown)
                | (NodeState::Registered, NodeState::Enabled)
                | (NodeState::Registered, NodeState::Disabled)
                | (NodeState::Enabled, NodeState::Disabled)
                | (NodeState::Disabled, NodeState::Enabled)
        );

        if !valid {
            return Err(FederationError::InvalidStateTransition {
                from: self.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }

    /// Validated move, returning the new state
    pub fn transition(self, to: NodeState) -> Result<NodeState> {
        self.validate_transition(to)?;
        Ok(to)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
