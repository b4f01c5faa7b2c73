//! Replication status of a group member.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Replication status of a node, ordered by synchronization progress.
///
/// Status reconciliation only ever produces `NonPrimary`, `Primary` and
/// `Joined`. The remaining values are set by the surrounding replication
/// machinery and survive reconciliation through carry-over.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeState {
    /// Not part of any trusted primary component.
    #[default]
    NonPrimary,
    /// Member of a primary component, synchronization unresolved.
    Primary,
    /// Receiving a state transfer.
    Joiner,
    /// Serving a state transfer.
    Donor,
    /// Caught up with the primary component.
    Joined,
    /// Fully synchronized and processing actions.
    Synced,
}

impl NodeState {
    /// Stable display string.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::NonPrimary => "NON-PRIMARY",
            NodeState::Primary => "PRIMARY",
            NodeState::Joiner => "JOINER",
            NodeState::Donor => "DONOR",
            NodeState::Joined => "JOINED",
            NodeState::Synced => "SYNCED",
        }
    }

    /// True if the node holds a complete copy of the replicated data.
    #[inline]
    pub fn is_joined(&self) -> bool {
        *self >= NodeState::Donor
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
