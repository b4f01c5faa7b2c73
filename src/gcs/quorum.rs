//! Quorum verdict consumed by status reconciliation.
//!
//! The verdict is computed elsewhere from all members' state messages. This
//! module only describes its shape.

use serde::{Deserialize, Serialize};

use super::state_msg::{GroupId, ProtocolVersions, Seqno, SEQNO_ILL};

/// Outcome of the group-wide quorum computation for one view change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateQuorum {
    /// Whether a safe primary component was formed.
    pub primary: bool,
    /// Agreed group identity of the new component.
    pub group_uuid: GroupId,
    /// Agreed action position of the new component.
    pub act_id: Seqno,
    /// Configuration id of the new component, -1 if non-primary.
    pub conf_id: i64,
    /// Protocol versions the component agreed to speak.
    pub versions: ProtocolVersions,
}

impl StateQuorum {
    /// Verdict of a primary component.
    pub fn primary(
        group_uuid: GroupId,
        act_id: Seqno,
        conf_id: i64,
        versions: ProtocolVersions,
    ) -> Self {
        StateQuorum {
            primary: true,
            group_uuid,
            act_id,
            conf_id,
            versions,
        }
    }

    /// Verdict of a failed quorum.
    pub fn non_primary() -> Self {
        StateQuorum {
            primary: false,
            group_uuid: GroupId::NIL,
            act_id: SEQNO_ILL,
            conf_id: -1,
            versions: ProtocolVersions::default(),
        }
    }
}
