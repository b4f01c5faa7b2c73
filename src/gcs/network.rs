//! In-memory transport for state exchange and fragments.
//!
//! Uses crossbeam channels to connect members. Every message is encoded with
//! bincode on send and decoded on receive, so the harness exercises the same
//! path a real transport would.

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

use super::defrag::Fragment;
use super::node::Channel;
use super::state_msg::StateMessage;

/// Messages carried by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GcsMessage {
    /// State exchange after a view change.
    State {
        /// View the exchange belongs to.
        view: u64,
        msg: StateMessage,
    },
    /// One fragment of an action.
    Fragment { channel: Channel, frg: Fragment },
}

impl GcsMessage {
    /// Serialize message to bytes using bincode.
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize message from bytes.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// A network endpoint for a single member.
pub struct NetworkEndpoint {
    /// This member's index.
    pub node_idx: u32,
    rx: Receiver<(u32, Vec<u8>)>,
    tx_map: HashMap<u32, Sender<(u32, Vec<u8>)>>,
    connected: HashMap<u32, Arc<AtomicBool>>,
}

impl NetworkEndpoint {
    fn is_up(&self, target: u32) -> bool {
        self.connected
            .get(&target)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(true)
    }

    /// Send a message to a specific member.
    ///
    /// Returns false if the link is down or the message could not be encoded.
    pub fn send_to(&self, target: u32, msg: &GcsMessage) -> bool {
        if !self.is_up(target) {
            return false;
        }
        let Some(tx) = self.tx_map.get(&target) else {
            return false;
        };
        match msg.serialize() {
            Ok(bytes) => tx.send((self.node_idx, bytes)).is_ok(),
            Err(e) => {
                warn!("Member {}: failed to encode message: {}", self.node_idx, e);
                false
            }
        }
    }

    /// Broadcast a message to every reachable member.
    ///
    /// Returns the number of members the message was sent to.
    pub fn broadcast(&self, msg: &GcsMessage) -> usize {
        let bytes = match msg.serialize() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Member {}: failed to encode message: {}", self.node_idx, e);
                return 0;
            }
        };

        let mut count = 0;
        for (&target, tx) in &self.tx_map {
            if !self.is_up(target) {
                continue;
            }
            if tx.send((self.node_idx, bytes.clone())).is_ok() {
                count += 1;
            }
        }
        count
    }

    /// Try to receive a message (non-blocking).
    ///
    /// Frames that fail to decode are dropped.
    pub fn try_recv(&self) -> Option<(u32, GcsMessage)> {
        loop {
            let (from, bytes) = self.rx.try_recv().ok()?;
            match GcsMessage::deserialize(&bytes) {
                Ok(msg) => return Some((from, msg)),
                Err(e) => {
                    warn!(
                        "Member {}: dropping undecodable frame from {}: {}",
                        self.node_idx, from, e
                    );
                }
            }
        }
    }

    /// Drain every pending message.
    pub fn drain(&self) -> Vec<(u32, GcsMessage)> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

/// Mock network that connects members via channels.
pub struct MockNetwork {
    cluster_size: u32,
    /// Key: (from, to), Value: connected flag.
    connections: HashMap<(u32, u32), Arc<AtomicBool>>,
    senders: HashMap<u32, Sender<(u32, Vec<u8>)>>,
    /// Taken when the endpoint is created.
    receivers: HashMap<u32, Receiver<(u32, Vec<u8>)>>,
}

impl MockNetwork {
    /// Create a fully connected network of `cluster_size` members.
    pub fn new(cluster_size: u32) -> Self {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        let mut connections = HashMap::new();

        for idx in 0..cluster_size {
            let (tx, rx) = unbounded();
            senders.insert(idx, tx);
            receivers.insert(idx, rx);
        }

        for from in 0..cluster_size {
            for to in 0..cluster_size {
                if from != to {
                    connections.insert((from, to), Arc::new(AtomicBool::new(true)));
                }
            }
        }

        MockNetwork {
            cluster_size,
            connections,
            senders,
            receivers,
        }
    }

    pub fn cluster_size(&self) -> u32 {
        self.cluster_size
    }

    /// Create the endpoint of member `idx`. Can only be called once per member.
    pub fn create_endpoint(&mut self, idx: u32) -> Option<NetworkEndpoint> {
        let rx = self.receivers.remove(&idx)?;

        let tx_map = self
            .senders
            .iter()
            .filter(|&(&id, _)| id != idx)
            .map(|(&id, tx)| (id, tx.clone()))
            .collect();

        let connected = self
            .connections
            .iter()
            .filter(|&(&(from, _), _)| from == idx)
            .map(|(&(_, to), flag)| (to, flag.clone()))
            .collect();

        Some(NetworkEndpoint {
            node_idx: idx,
            rx,
            tx_map,
            connected,
        })
    }

    /// Split the network in two: members in `side` only reach each other,
    /// as do the remaining members.
    pub fn partition(&self, side: &[u32]) {
        for (&(from, to), flag) in &self.connections {
            let same = side.contains(&from) == side.contains(&to);
            flag.store(same, Ordering::SeqCst);
        }
    }

    /// Restore all links.
    pub fn heal(&self) {
        for flag in self.connections.values() {
            flag.store(true, Ordering::SeqCst);
        }
    }

    /// Check if `from` can reach `to`.
    pub fn is_connected(&self, from: u32, to: u32) -> bool {
        self.connections
            .get(&(from, to))
            .map(|f| f.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Members `idx` can currently reach, itself included, in index order.
    pub fn component_of(&self, idx: u32) -> Vec<u32> {
        (0..self.cluster_size)
            .filter(|&other| other == idx || self.is_connected(idx, other))
            .collect()
    }
}
