//! Per-channel reassembly of actions from transport fragments.
//!
//! An action is sent as a sequence of fragments numbered from 0. The buffer
//! accumulates them in order and hands back the complete action once the
//! declared size has been received.
//!
//! # Lifecycle
//!
//! - `new`: empty buffer.
//! - `reset`: discard the partial action, keep allocated storage.
//! - `release`: discard the partial action and free storage.
//! - `forget`: move the buffer out to a new owner. The original is left
//!   marked forgotten and must not be used again.

use std::mem;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::errors::DefragError;

/// Largest action the buffer will reassemble (64 MB).
pub const MAX_ACTION_SIZE: usize = 64 * 1024 * 1024;

/// One transport-level piece of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Sender-local id of the action this fragment belongs to.
    pub act_id: u64,
    /// Total size of the action in bytes.
    pub act_size: usize,
    /// Position of this fragment within the action.
    pub frag_no: u64,
    pub payload: Vec<u8>,
}

/// A completely reassembled action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub act_id: u64,
    pub buf: Vec<u8>,
}

/// Split `buf` into fragments of at most `frag_size` bytes.
///
/// An empty action still produces one (empty) fragment.
pub fn fragment(act_id: u64, buf: &[u8], frag_size: usize) -> Vec<Fragment> {
    let frag_size = frag_size.max(1);
    if buf.is_empty() {
        return vec![Fragment {
            act_id,
            act_size: 0,
            frag_no: 0,
            payload: Vec::new(),
        }];
    }
    buf.chunks(frag_size)
        .enumerate()
        .map(|(i, chunk)| Fragment {
            act_id,
            act_size: buf.len(),
            frag_no: i as u64,
            payload: chunk.to_vec(),
        })
        .collect()
}

/// Accumulator for one sender on one channel.
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    /// Action currently being reassembled, if any.
    act_id: Option<u64>,
    /// Declared size of the action in progress.
    act_size: usize,
    /// Next expected fragment number.
    frag_no: u64,
    /// Reassembled bytes so far.
    head: Vec<u8>,
    /// Set by `reset` until the next action completes.
    reset: bool,
    /// Ownership was moved elsewhere.
    forgotten: bool,
}

impl ReassemblyBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment.
    ///
    /// Returns the complete action when `frg` was its last fragment.
    pub fn handle_fragment(&mut self, frg: &Fragment) -> Result<Option<Action>, DefragError> {
        if self.forgotten {
            return Err(DefragError::Forgotten);
        }

        match self.act_id {
            Some(act_id) if frg.act_id == act_id && frg.frag_no == self.frag_no => {}
            Some(act_id) => {
                if self.reset && frg.frag_no == 0 {
                    // Sender restarted the action after our reset.
                    warn!(
                        "Restarting action {} with action {} after reset",
                        act_id, frg.act_id
                    );
                    self.begin(frg)?;
                } else {
                    return Err(DefragError::OutOfOrder {
                        expected_act: act_id,
                        expected_frag: self.frag_no,
                        act_id: frg.act_id,
                        frag_no: frg.frag_no,
                    });
                }
            }
            None => {
                if frg.frag_no == 0 {
                    self.begin(frg)?;
                } else if self.reset {
                    // Tail of an action interrupted by reset.
                    debug!(
                        "Ignoring fragment {}:{} after reset",
                        frg.act_id, frg.frag_no
                    );
                    return Ok(None);
                } else {
                    return Err(DefragError::OutOfOrder {
                        expected_act: frg.act_id,
                        expected_frag: 0,
                        act_id: frg.act_id,
                        frag_no: frg.frag_no,
                    });
                }
            }
        }

        let received = self.head.len();
        if received + frg.payload.len() > self.act_size {
            return Err(DefragError::Overflow {
                act_id: frg.act_id,
                act_size: self.act_size,
                received,
                len: frg.payload.len(),
            });
        }

        self.head.extend_from_slice(&frg.payload);
        self.frag_no += 1;

        if self.head.len() < self.act_size {
            return Ok(None);
        }

        let action = Action {
            act_id: frg.act_id,
            buf: mem::take(&mut self.head),
        };
        self.act_id = None;
        self.act_size = 0;
        self.frag_no = 0;
        self.reset = false;
        Ok(Some(action))
    }

    fn begin(&mut self, frg: &Fragment) -> Result<(), DefragError> {
        if frg.act_size > MAX_ACTION_SIZE {
            return Err(DefragError::TooLarge {
                size: frg.act_size,
                max: MAX_ACTION_SIZE,
            });
        }

        self.head.clear();
        self.head
            .try_reserve_exact(frg.act_size)
            .map_err(|_| DefragError::Allocation {
                act_id: frg.act_id,
                size: frg.act_size,
            })?;

        self.act_id = Some(frg.act_id);
        self.act_size = frg.act_size;
        self.frag_no = 0;
        Ok(())
    }

    /// Discard the partial action but keep allocated storage.
    pub fn reset(&mut self) {
        if self.forgotten {
            return;
        }
        self.head.clear();
        self.act_id = None;
        self.act_size = 0;
        self.frag_no = 0;
        self.reset = true;
    }

    /// Discard the partial action and free storage.
    pub fn release(&mut self) {
        if self.forgotten {
            return;
        }
        self.head = Vec::new();
        self.act_id = None;
        self.act_size = 0;
        self.frag_no = 0;
    }

    /// Relinquish ownership: the buffer's state and storage move to the
    /// returned value, `self` is left forgotten.
    ///
    /// The returned buffer is always usable, even if `self` was already
    /// forgotten; it is empty in that case.
    pub fn forget(&mut self) -> ReassemblyBuffer {
        let mut moved = mem::take(self);
        moved.forgotten = false;
        self.forgotten = true;
        moved
    }

    /// Allocated storage in bytes.
    pub fn capacity(&self) -> usize {
        self.head.capacity()
    }

    /// Bytes of the partial action received so far.
    pub fn received(&self) -> usize {
        self.head.len()
    }

    /// No action in progress.
    pub fn is_idle(&self) -> bool {
        self.act_id.is_none()
    }

    pub fn is_reset(&self) -> bool {
        self.reset
    }

    pub fn is_forgotten(&self) -> bool {
        self.forgotten
    }
}
