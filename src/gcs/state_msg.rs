//! State message exchanged by every member after a view change.
//!
//! A state message is a read-only snapshot of what a peer reported about
//! itself at exchange time. Once recorded it is owned by exactly one
//! [`GcsNode`](super::node::GcsNode).

use std::fmt;

use serde::{Deserialize, Serialize};

use super::state::NodeState;

/// Global sequence number of a replicated action.
pub type Seqno = i64;

/// Undefined sequence number.
pub const SEQNO_ILL: Seqno = -1;

/// Identity of one instance (epoch) of the replicated group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub [u8; 16]);

impl GroupId {
    /// The nil group identity.
    pub const NIL: GroupId = GroupId([0u8; 16]);

    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Protocol versions negotiated by a member.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersions {
    /// Group communication protocol.
    pub gcs: i32,
    /// Replication protocol.
    pub repl: i32,
    /// Application protocol.
    pub appl: i32,
}

impl ProtocolVersions {
    pub fn new(gcs: i32, repl: i32, appl: i32) -> Self {
        ProtocolVersions { gcs, repl, appl }
    }
}

/// Snapshot of a peer's self-reported status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMessage {
    group_uuid: GroupId,
    act_id: Seqno,
    last_applied: Seqno,
    prim_state: NodeState,
    current_state: NodeState,
    name: String,
    inc_addr: String,
    versions: ProtocolVersions,
}

impl StateMessage {
    /// Build a state message describing the sender.
    pub fn new(
        group_uuid: GroupId,
        act_id: Seqno,
        current_state: NodeState,
        prim_state: NodeState,
        name: impl Into<String>,
        inc_addr: impl Into<String>,
        versions: ProtocolVersions,
    ) -> Self {
        StateMessage {
            group_uuid,
            act_id,
            last_applied: SEQNO_ILL,
            prim_state,
            current_state,
            name: name.into(),
            inc_addr: inc_addr.into(),
            versions,
        }
    }

    /// Set the last action the sender applied locally.
    pub fn with_last_applied(mut self, last_applied: Seqno) -> Self {
        self.last_applied = last_applied;
        self
    }

    /// Group identity the sender's history belongs to.
    pub fn group_uuid(&self) -> &GroupId {
        &self.group_uuid
    }

    /// Last committed action position known to the sender.
    pub fn act_id(&self) -> Seqno {
        self.act_id
    }

    pub fn last_applied(&self) -> Seqno {
        self.last_applied
    }

    /// Status the sender had in the last primary component it belonged to.
    pub fn prim_state(&self) -> NodeState {
        self.prim_state
    }

    /// Status the sender reports as current.
    pub fn current_state(&self) -> NodeState {
        self.current_state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inc_addr(&self) -> &str {
        &self.inc_addr
    }

    pub fn versions(&self) -> ProtocolVersions {
        self.versions
    }
}
