//! Group communication node core.
//!
//! After every view change each member sends a state message describing
//! itself. Once a quorum verdict is available, every member's node context is
//! reconciled against it:
//! - NonPrimary verdict: every node drops to `NonPrimary`
//! - Same group, same position: `Joined`, or the status carried over from
//!   the last primary component
//! - Position gap or different group: `Primary`, a state transfer is needed
//!
//! # Invariants
//!
//! 1. **Single Writer**: node contexts are mutated by one control flow only,
//!    one view change at a time.
//! 2. **Exclusive Ownership**: a node context owns at most one state message
//!    and its two reassembly buffers; `transfer` moves them, never shares.

pub mod defrag;
pub mod errors;
pub mod network;
pub mod node;
pub mod quorum;
pub mod state;
pub mod state_msg;


pub use defrag::{fragment, Action, Fragment, ReassemblyBuffer, MAX_ACTION_SIZE};
pub use errors::{DefragError, NodeError};
pub use network::{GcsMessage, MockNetwork, NetworkEndpoint};
pub use node::{Channel, GcsNode, NodeId, NODE_ID_MAX_LEN, NODE_NO_ADDR, NODE_NO_NAME};
pub use quorum::StateQuorum;
pub use state::NodeState;
pub use state_msg::{GroupId, ProtocolVersions, Seqno, StateMessage, SEQNO_ILL};
