use thiserror::Error;

/// Failures of node context operations.
///
/// All of these are contract violations: the caller must abort the current
/// view-change round and start over from the next one.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodeError {
    /// Node identifier was empty.
    #[error("node id must not be empty")]
    EmptyId,

    /// Node identifier does not fit the fixed-capacity id field.
    #[error("node id length {len} exceeds maximum {max}")]
    IdTooLong { len: usize, max: usize },

    /// Status reconciliation reached the comparison path but no state
    /// message was ever recorded for the node.
    #[error("no state message recorded for node {id}")]
    NoStateMessage { id: String },
}

/// Failures while reassembling an action from fragments.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DefragError {
    /// Fragment does not continue the action in progress.
    #[error("unordered fragment {act_id}:{frag_no}, expected {expected_act}:{expected_frag}")]
    OutOfOrder {
        expected_act: u64,
        expected_frag: u64,
        act_id: u64,
        frag_no: u64,
    },

    /// Fragment carries more bytes than the action declared.
    #[error("fragment overflows action {act_id}: {received} + {len} > {act_size}")]
    Overflow {
        act_id: u64,
        act_size: usize,
        received: usize,
        len: usize,
    },

    /// Declared action size exceeds the reassembly limit.
    #[error("action size {size} exceeds maximum {max}")]
    TooLarge { size: usize, max: usize },

    /// Storage for the action could not be allocated.
    #[error("failed to allocate {size} bytes for action {act_id}")]
    Allocation { act_id: u64, size: usize },

    /// Buffer ownership was relinquished; it must not be used again.
    #[error("reassembly buffer used after forget")]
    Forgotten,
}
