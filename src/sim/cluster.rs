//! Cluster of simulated members driving view changes.
//!
//! Each member keeps a node context for every member of the group, itself
//! included, and reconciles them after every view change. The quorum used
//! here is a naive stand-in (majority of the group, most advanced state wins);
//! the real computation lives outside the node core.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, info};

use crate::gcs::defrag::fragment;
use crate::gcs::errors::{DefragError, NodeError};
use crate::gcs::network::{GcsMessage, MockNetwork, NetworkEndpoint};
use crate::gcs::node::{Channel, GcsNode};
use crate::gcs::quorum::StateQuorum;
use crate::gcs::state::NodeState;
use crate::gcs::state_msg::{GroupId, ProtocolVersions, Seqno, StateMessage, SEQNO_ILL};

/// Errors that abort a simulation round.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SimError {
    #[error("node context: {0}")]
    Node(#[from] NodeError),

    #[error("member {member}: reassembly from {from} failed: {source}")]
    Defrag {
        member: u32,
        from: u32,
        source: DefragError,
    },

    #[error("cluster size {0} out of range")]
    ClusterSize(u32),

    #[error("no synced member in a primary component")]
    NoPrimary,
}

/// Configuration of a simulated cluster.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Number of members.
    pub cluster_size: u32,
    /// Maximum fragment payload in bytes.
    pub frag_size: usize,
    /// Protocol versions every member speaks.
    pub versions: ProtocolVersions,
    /// Identity of the group all members bootstrap into.
    pub group_uuid: GroupId,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            cluster_size: 3,
            frag_size: 16,
            versions: ProtocolVersions::new(0, 1, 1),
            group_uuid: GroupId([0x42; 16]),
        }
    }
}

/// What one member concluded in one view.
#[derive(Debug, Clone)]
pub struct MemberReport {
    pub idx: u32,
    /// Whether the member ended up in a primary component.
    pub primary: bool,
    /// Members heard from in this view, sorted.
    pub component: Vec<u32>,
    pub act_id: Seqno,
    /// Status the member derived for every member of its component.
    pub statuses: Vec<(u32, NodeState)>,
}

/// Outcome of one view change across the cluster.
#[derive(Debug, Clone)]
pub struct ViewReport {
    pub view: u64,
    pub members: Vec<MemberReport>,
}

impl ViewReport {
    /// Every pair of members sharing a component derived identical statuses.
    pub fn agreement(&self) -> bool {
        self.members.iter().all(|a| {
            self.members
                .iter()
                .filter(|b| b.component == a.component)
                .all(|b| b.statuses == a.statuses && b.primary == a.primary)
        })
    }
}

/// One simulated member.
pub struct Member {
    pub idx: u32,
    endpoint: NetworkEndpoint,
    group_uuid: GroupId,
    act_id: Seqno,
    current: NodeState,
    prim_state: NodeState,
    primary: bool,
    /// Node context of every member, indexed by member index.
    table: Vec<GcsNode>,
    /// Members heard from in the current view.
    heard: HashSet<u32>,
    next_local_act: u64,
}

impl Member {
    fn new(idx: u32, endpoint: NetworkEndpoint, config: &SimConfig) -> Result<Self, NodeError> {
        let table = (0..config.cluster_size)
            .map(|i| GcsNode::new(&node_id(i), None, None, config.versions))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Member {
            idx,
            endpoint,
            group_uuid: config.group_uuid,
            act_id: 0,
            current: NodeState::NonPrimary,
            prim_state: NodeState::NonPrimary,
            primary: false,
            table,
            heard: HashSet::new(),
            next_local_act: 0,
        })
    }

    fn state_message(&self, versions: ProtocolVersions) -> StateMessage {
        StateMessage::new(
            self.group_uuid,
            self.act_id,
            self.current,
            self.prim_state,
            format!("n{}", self.idx),
            format!("127.0.0.1:{}", 4567 + self.idx),
            versions,
        )
        .with_last_applied(self.act_id)
    }

    /// Local status as this member itself sees it.
    pub fn status(&self) -> NodeState {
        self.current
    }

    pub fn act_id(&self) -> Seqno {
        self.act_id
    }

    pub fn group_uuid(&self) -> GroupId {
        self.group_uuid
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// This member's node context of member `idx`.
    pub fn node(&self, idx: u32) -> Option<&GcsNode> {
        self.table.get(idx as usize)
    }

    /// Lose all replicated state, as a member restarted from scratch does.
    pub fn wipe(&mut self) {
        self.group_uuid = GroupId::NIL;
        self.act_id = SEQNO_ILL;
        self.current = NodeState::NonPrimary;
        self.prim_state = NodeState::NonPrimary;
        self.table[self.idx as usize].reset_local();
    }

    fn begin_view(&mut self, view: u64, versions: ProtocolVersions) {
        let msg = self.state_message(versions);
        self.endpoint.broadcast(&GcsMessage::State {
            view,
            msg: msg.clone(),
        });
        self.table[self.idx as usize].record_state(msg);
        self.heard.clear();
        self.heard.insert(self.idx);
    }

    fn receive(&mut self, view: u64) -> Result<(), SimError> {
        for (from, msg) in self.endpoint.drain() {
            match msg {
                GcsMessage::State { view: v, msg } if v == view => {
                    self.table[from as usize].record_state(msg);
                    self.heard.insert(from);
                }
                GcsMessage::State { view: v, .. } => {
                    debug!("Member {}: stale state message from {} (view {})", self.idx, from, v);
                }
                GcsMessage::Fragment { channel, frg } => {
                    let action = self.table[from as usize]
                        .handle_fragment(channel, &frg)
                        .map_err(|source| SimError::Defrag {
                            member: self.idx,
                            from,
                            source,
                        })?;
                    if let Some(action) = action {
                        self.apply(from, channel, &action.buf);
                    }
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, from: u32, channel: Channel, buf: &[u8]) {
        match channel {
            Channel::Application => {
                if self.primary && self.current == NodeState::Synced {
                    self.act_id += 1;
                    self.table[self.idx as usize].set_last_applied(self.act_id);
                }
            }
            Channel::OutOfBand => {
                if let Ok(bytes) = <[u8; 8]>::try_from(buf) {
                    self.table[from as usize].set_last_applied(i64::from_le_bytes(bytes));
                }
            }
        }
    }

    fn naive_quorum(&self, cluster_size: u32, view: u64) -> StateQuorum {
        if self.heard.len() * 2 <= cluster_size as usize {
            return StateQuorum::non_primary();
        }

        let best = self
            .heard
            .iter()
            .filter_map(|&i| self.table[i as usize].state_msg())
            .filter(|m| !m.group_uuid().is_nil())
            .max_by_key(|m| (m.act_id(), m.group_uuid().0));

        let versions = self
            .heard
            .iter()
            .map(|&i| self.table[i as usize].versions())
            .min_by_key(|v| v.gcs)
            .unwrap_or_default();

        match best {
            Some(m) => StateQuorum::primary(*m.group_uuid(), m.act_id(), view as i64, versions),
            None => StateQuorum::non_primary(),
        }
    }

    fn reconcile(&mut self, cluster_size: u32, view: u64) -> Result<MemberReport, SimError> {
        let quorum = self.naive_quorum(cluster_size, view);

        let mut component: Vec<u32> = self.heard.iter().copied().collect();
        component.sort_unstable();

        let mut statuses = Vec::with_capacity(component.len());
        for (i, node) in self.table.iter_mut().enumerate() {
            let i = i as u32;
            if self.heard.contains(&i) {
                statuses.push((i, node.update_status(&quorum)?));
            } else {
                // Dropped from the view: partial data can't be trusted.
                node.reset();
            }
        }
        statuses.sort_unstable();

        self.primary = quorum.primary;
        if quorum.primary {
            match self.table[self.idx as usize].status() {
                NodeState::Primary => {
                    // Behind: take a state transfer from the component.
                    info!(
                        "Member {}: state transfer {} -> {}",
                        self.idx, self.act_id, quorum.act_id
                    );
                    self.group_uuid = quorum.group_uuid;
                    self.act_id = quorum.act_id;
                    self.current = NodeState::Synced;
                }
                NodeState::Joined => self.current = NodeState::Synced,
                other => self.current = other,
            }
            self.prim_state = self.current;
        } else {
            self.current = NodeState::NonPrimary;
        }

        Ok(MemberReport {
            idx: self.idx,
            primary: self.primary,
            component,
            act_id: self.act_id,
            statuses,
        })
    }
}

fn node_id(idx: u32) -> String {
    format!("node-{}", idx)
}

/// The simulated group.
pub struct Cluster {
    config: SimConfig,
    network: MockNetwork,
    members: Vec<Member>,
    view: u64,
}

impl Cluster {
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        if config.cluster_size == 0 || config.cluster_size > 64 {
            return Err(SimError::ClusterSize(config.cluster_size));
        }

        let mut network = MockNetwork::new(config.cluster_size);
        let mut members = Vec::with_capacity(config.cluster_size as usize);
        for idx in 0..config.cluster_size {
            let endpoint = network
                .create_endpoint(idx)
                .ok_or(SimError::ClusterSize(config.cluster_size))?;
            members.push(Member::new(idx, endpoint, &config)?);
        }

        Ok(Cluster {
            config,
            network,
            members,
            view: 0,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn network(&self) -> &MockNetwork {
        &self.network
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member_mut(&mut self, idx: u32) -> Option<&mut Member> {
        self.members.get_mut(idx as usize)
    }

    pub fn view(&self) -> u64 {
        self.view
    }

    /// Run one view change: state exchange, quorum, status reconciliation.
    pub fn view_change(&mut self) -> Result<ViewReport, SimError> {
        self.view += 1;
        let view = self.view;
        let versions = self.config.versions;

        for member in &mut self.members {
            member.begin_view(view, versions);
        }

        let mut reports = Vec::with_capacity(self.members.len());
        for member in &mut self.members {
            member.receive(view)?;
            reports.push(member.reconcile(self.config.cluster_size, view)?);
        }

        for r in &reports {
            debug!(
                "View {}: member {} primary={} component={:?} statuses={:?}",
                view, r.idx, r.primary, r.component, r.statuses
            );
        }

        Ok(ViewReport {
            view,
            members: reports,
        })
    }

    /// Replicate one action from a synced member of a primary component.
    ///
    /// Returns the sender's index.
    pub fn replicate(&mut self, payload: &[u8]) -> Result<u32, SimError> {
        let sender = self
            .members
            .iter()
            .position(|m| m.primary && m.current == NodeState::Synced)
            .ok_or(SimError::NoPrimary)?;

        let member = &mut self.members[sender];
        member.next_local_act += 1;
        for frg in fragment(member.next_local_act, payload, self.config.frag_size) {
            member.endpoint.broadcast(&GcsMessage::Fragment {
                channel: Channel::Application,
                frg,
            });
        }
        member.apply(sender as u32, Channel::Application, payload);

        // Report progress out of band.
        member.next_local_act += 1;
        let last = member.act_id.to_le_bytes();
        for frg in fragment(member.next_local_act, &last, self.config.frag_size) {
            member.endpoint.broadcast(&GcsMessage::Fragment {
                channel: Channel::OutOfBand,
                frg,
            });
        }

        for member in &mut self.members {
            member.receive(self.view)?;
        }

        Ok(sender as u32)
    }

    /// Members of primary components that disagree on the action position.
    pub fn divergent(&self) -> Vec<u32> {
        let primary: Vec<&Member> = self.members.iter().filter(|m| m.primary).collect();
        let Some(max) = primary.iter().map(|m| m.act_id).max() else {
            return Vec::new();
        };
        primary
            .iter()
            .filter(|m| m.act_id != max)
            .map(|m| m.idx)
            .collect()
    }
}
