//! Node context: the live record of one group member.
//!
//! # Invariants
//!
//! 1. **Single state message**: a node retains at most one state message.
//!    Recording a new one drops the previous one.
//! 2. **Display strings**: `name` and `inc_addr` are set from creation on,
//!    to a sentinel if not supplied. Only `transfer` and `destroy` empty them.
//! 3. **Exclusive buffers**: each node owns its two reassembly buffers.
//!    `transfer` moves them out and leaves the source's buffers forgotten.
//!
//! All mutation happens on the single control flow that processes view
//! changes. Nothing here locks.

use std::fmt;
use std::mem;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::defrag::{Action, Fragment, ReassemblyBuffer};
use super::errors::{DefragError, NodeError};
use super::quorum::StateQuorum;
use super::state::NodeState;
use super::state_msg::{ProtocolVersions, Seqno, StateMessage, SEQNO_ILL};

/// Longest accepted node id. The id field holds this plus a terminator.
pub const NODE_ID_MAX_LEN: usize = 36;

/// Name of a node that did not report one.
pub const NODE_NO_NAME: &str = "unspecified";

/// Incoming address of a node that did not report one.
pub const NODE_NO_ADDR: &str = "unspecified";

/// Validated, non-empty member identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: &str) -> Result<Self, NodeError> {
        if id.is_empty() {
            return Err(NodeError::EmptyId);
        }
        if id.len() > NODE_ID_MAX_LEN {
            return Err(NodeError::IdTooLong {
                len: id.len(),
                max: NODE_ID_MAX_LEN,
            });
        }
        Ok(NodeId(id.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Message channel a fragment arrived on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    /// Totally ordered application actions.
    Application,
    /// Out-of-band service messages.
    OutOfBand,
}

/// Node context of one group member.
#[derive(Debug)]
pub struct GcsNode {
    id: NodeId,
    name: String,
    inc_addr: String,
    versions: ProtocolVersions,
    /// Live replication status.
    status: NodeState,
    /// Status the member had in the last primary component it was part of.
    last_prim_state: NodeState,
    last_applied: Seqno,
    state_msg: Option<StateMessage>,
    app: ReassemblyBuffer,
    oob: ReassemblyBuffer,
}

impl GcsNode {
    /// Create the context of a newly seen member.
    ///
    /// Fails if `id` is empty or longer than [`NODE_ID_MAX_LEN`].
    pub fn new(
        id: &str,
        name: Option<&str>,
        inc_addr: Option<&str>,
        versions: ProtocolVersions,
    ) -> Result<Self, NodeError> {
        let id = NodeId::new(id)?;

        Ok(GcsNode {
            id,
            name: name.unwrap_or(NODE_NO_NAME).to_owned(),
            inc_addr: inc_addr.unwrap_or(NODE_NO_ADDR).to_owned(),
            versions,
            status: NodeState::NonPrimary,
            last_prim_state: NodeState::NonPrimary,
            last_applied: SEQNO_ILL,
            state_msg: None,
            app: ReassemblyBuffer::new(),
            oob: ReassemblyBuffer::new(),
        })
    }

    /// Move everything `src` owns into `self`.
    ///
    /// Whatever `self` owned before is dropped. `src` keeps its id but is left
    /// without strings or state message, and with forgotten buffers, so a
    /// later `destroy` of `src` releases nothing.
    pub fn transfer(&mut self, src: &mut GcsNode) {
        let moved = GcsNode {
            id: src.id.clone(),
            name: mem::take(&mut src.name),
            inc_addr: mem::take(&mut src.inc_addr),
            versions: src.versions,
            status: src.status,
            last_prim_state: src.last_prim_state,
            last_applied: src.last_applied,
            state_msg: src.state_msg.take(),
            app: src.app.forget(),
            oob: src.oob.forget(),
        };

        *self = moved;
    }

    /// Discard partially received actions, keeping buffer storage.
    ///
    /// Used for the local member after it reconnects.
    pub fn reset_local(&mut self) {
        self.app.reset();
        self.oob.reset();
    }

    /// Free buffer storage and restart reassembly from scratch.
    ///
    /// Used for a peer whose partial data can no longer be trusted.
    pub fn reset(&mut self) {
        self.app.release();
        self.oob.release();
        self.reset_local();
    }

    /// Release all owned resources. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        self.reset();
        self.name = String::new();
        self.inc_addr = String::new();
        self.state_msg = None;
    }

    /// Take ownership of a freshly received state message.
    ///
    /// This is the only way status, protocol versions, name and address change
    /// after creation.
    pub fn record_state(&mut self, state_msg: StateMessage) {
        self.status = state_msg.current_state();
        self.last_prim_state = state_msg.prim_state();
        self.versions = state_msg.versions();
        self.last_applied = state_msg.last_applied();
        self.name = state_msg.name().to_owned();
        self.inc_addr = state_msg.inc_addr().to_owned();

        self.state_msg = Some(state_msg);
    }

    /// Derive the node's status from the quorum verdict of a view change.
    ///
    /// A primary verdict requires a recorded state message; without one the
    /// status is left untouched and `NoStateMessage` is returned.
    pub fn update_status(&mut self, quorum: &StateQuorum) -> Result<NodeState, NodeError> {
        if !quorum.primary {
            // Nothing about this node can be trusted without a primary component.
            self.status = NodeState::NonPrimary;
            return Ok(self.status);
        }

        let state_msg = self.state_msg.as_ref().ok_or_else(|| NodeError::NoStateMessage {
            id: self.id.to_string(),
        })?;

        if self.versions.gcs < quorum.versions.gcs {
            warn!(
                "Node {} speaks gcs protocol {}, component agreed on {}",
                self.name, self.versions.gcs, quorum.versions.gcs
            );
        }

        let status = if *state_msg.group_uuid() != quorum.group_uuid {
            // Different group: all previous history is void.
            NodeState::Primary
        } else if state_msg.act_id() != quorum.act_id {
            // Gap in sequence numbers, needs a state transfer.
            NodeState::Primary
        } else if self.last_prim_state == NodeState::NonPrimary {
            // Just joined, but already up to date.
            debug!("Setting {} state to {}", self.name, NodeState::Joined);
            NodeState::Joined
        } else {
            debug!(
                "Carry over last prim state for {}: {}",
                self.name, self.last_prim_state
            );
            self.last_prim_state
        };

        self.status = status;
        Ok(status)
    }

    /// Advance the last applied action. Regressions are ignored.
    pub fn set_last_applied(&mut self, seqno: Seqno) {
        if seqno < self.last_applied {
            warn!(
                "Received bogus last applied {} from {}, current {}",
                seqno, self.name, self.last_applied
            );
            return;
        }
        self.last_applied = seqno;
    }

    /// Feed a fragment into the buffer of `channel`.
    pub fn handle_fragment(
        &mut self,
        channel: Channel,
        frg: &Fragment,
    ) -> Result<Option<Action>, DefragError> {
        match channel {
            Channel::Application => self.app.handle_fragment(frg),
            Channel::OutOfBand => self.oob.handle_fragment(frg),
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
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

    pub fn status(&self) -> NodeState {
        self.status
    }

    pub fn last_prim_state(&self) -> NodeState {
        self.last_prim_state
    }

    pub fn last_applied(&self) -> Seqno {
        self.last_applied
    }

    /// True if the member holds a full copy of the data.
    pub fn is_joined(&self) -> bool {
        self.status.is_joined()
    }

    /// Most recently recorded state message.
    pub fn state_msg(&self) -> Option<&StateMessage> {
        self.state_msg.as_ref()
    }

    pub fn app(&self) -> &ReassemblyBuffer {
        &self.app
    }

    pub fn oob(&self) -> &ReassemblyBuffer {
        &self.oob
    }

    pub fn app_mut(&mut self) -> &mut ReassemblyBuffer {
        &mut self.app
    }

    pub fn oob_mut(&mut self) -> &mut ReassemblyBuffer {
        &mut self.oob
    }
}
