//! View-change simulation.
//!
//! Drives the node core the way the group communication layer does: a
//! nemesis reshapes the network, members exchange state messages, a stand-in
//! quorum is computed and every node context is reconciled.

pub mod cluster;
pub mod nemesis;

#[cfg(test)]
mod tests;

pub use cluster::{Cluster, Member, MemberReport, SimConfig, SimError, ViewReport};
pub use nemesis::{Fault, FaultEvent, Nemesis, NemesisConfig};
