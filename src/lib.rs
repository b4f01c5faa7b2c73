//! Membership and replication-status reconciliation for a group
//! communication layer.
//!
//! - `gcs`: node contexts, state messages, quorum verdicts, reassembly buffers
//! - `sim`: a view-change simulator built on top of `gcs`

pub mod gcs;
pub mod sim;
