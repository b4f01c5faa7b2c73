//! View-change simulation tests.

use crate::gcs::state::NodeState;
use crate::gcs::state_msg::GroupId;

use super::cluster::{Cluster, SimConfig, SimError};
use super::nemesis::{Fault, Nemesis, NemesisConfig};

fn cluster(size: u32) -> Cluster {
    Cluster::new(SimConfig {
        cluster_size: size,
        ..SimConfig::default()
    })
    .unwrap()
}

fn statuses_seen_by(report: &super::ViewReport, idx: u32) -> Vec<(u32, NodeState)> {
    report.members[idx as usize].statuses.clone()
}

#[test]
fn test_bootstrap_view_syncs_everyone() {
    let mut cluster = cluster(3);
    let report = cluster.view_change().unwrap();

    assert!(report.agreement());
    for m in &report.members {
        assert!(m.primary);
        assert_eq!(m.component, vec![0, 1, 2]);
        // Up to date but never in a primary component before.
        assert!(m.statuses.iter().all(|&(_, s)| s == NodeState::Joined));
    }
    for m in cluster.members() {
        assert_eq!(m.status(), NodeState::Synced);
    }
}

#[test]
fn test_cluster_size_validated() {
    assert!(matches!(
        Cluster::new(SimConfig {
            cluster_size: 0,
            ..SimConfig::default()
        }),
        Err(SimError::ClusterSize(0))
    ));
}

#[test]
fn test_lagging_member_is_demoted_then_caught_up() {
    let mut cluster = cluster(3);
    cluster.view_change().unwrap();

    cluster.network().partition(&[2]);
    let report = cluster.view_change().unwrap();
    assert!(report.members[0].primary && report.members[1].primary);
    assert!(!report.members[2].primary);
    assert_eq!(
        statuses_seen_by(&report, 2),
        vec![(2, NodeState::NonPrimary)]
    );

    let sender = cluster.replicate(b"deposit alice 100").unwrap();
    assert_ne!(sender, 2);
    assert_eq!(cluster.members()[0].act_id(), 1);
    assert_eq!(cluster.members()[1].act_id(), 1);
    assert_eq!(cluster.members()[2].act_id(), 0);

    // Out-of-band progress reports reached the other primary member only.
    let other = if sender == 0 { 1 } else { 0 };
    assert_eq!(
        cluster.members()[other as usize]
            .node(sender)
            .unwrap()
            .last_applied(),
        1
    );

    cluster.network().heal();
    let report = cluster.view_change().unwrap();
    assert!(report.agreement());
    assert_eq!(
        statuses_seen_by(&report, 0),
        vec![
            (0, NodeState::Synced),
            (1, NodeState::Synced),
            (2, NodeState::Primary),
        ]
    );

    assert_eq!(cluster.members()[2].act_id(), 1);
    assert_eq!(cluster.members()[2].status(), NodeState::Synced);
    assert!(cluster.divergent().is_empty());
}

#[test]
fn test_transient_partition_carries_over_status() {
    let mut cluster = cluster(3);
    cluster.view_change().unwrap();

    cluster.network().partition(&[1]);
    cluster.view_change().unwrap();
    assert_eq!(cluster.members()[1].status(), NodeState::NonPrimary);

    cluster.network().heal();
    let report = cluster.view_change().unwrap();
    assert!(report.agreement());
    assert!(statuses_seen_by(&report, 0)
        .iter()
        .all(|&(_, s)| s == NodeState::Synced));
}

#[test]
fn test_wiped_member_joins_new_group_history() {
    let mut cluster = cluster(3);
    cluster.view_change().unwrap();
    cluster.replicate(b"a").unwrap();

    cluster.member_mut(1).unwrap().wipe();
    assert_eq!(cluster.members()[1].group_uuid(), GroupId::NIL);

    let report = cluster.view_change().unwrap();
    assert!(report.agreement());
    assert_eq!(
        statuses_seen_by(&report, 0),
        vec![
            (0, NodeState::Synced),
            (1, NodeState::Primary),
            (2, NodeState::Synced),
        ]
    );
    assert_eq!(cluster.members()[1].group_uuid(), SimConfig::default().group_uuid);
    assert_eq!(cluster.members()[1].act_id(), 1);
}

#[test]
fn test_even_split_has_no_primary() {
    let mut cluster = cluster(4);
    cluster.view_change().unwrap();

    cluster.network().partition(&[0, 1]);
    let report = cluster.view_change().unwrap();
    assert!(report.members.iter().all(|m| !m.primary));
    assert!(report
        .members
        .iter()
        .all(|m| m.statuses.iter().all(|&(_, s)| s == NodeState::NonPrimary)));

    assert_eq!(cluster.replicate(b"x"), Err(SimError::NoPrimary));
}

#[test]
fn test_random_faults_keep_members_consistent() {
    let mut cluster = cluster(5);
    let mut nemesis = Nemesis::new(NemesisConfig {
        seed: 42,
        ..NemesisConfig::default()
    });

    cluster.view_change().unwrap();
    for round in 0..100u32 {
        nemesis.step(&mut cluster);
        let report = cluster.view_change().unwrap();
        assert!(report.agreement(), "disagreement in view {}", report.view);

        match cluster.replicate(format!("payload-{}", round).as_bytes()) {
            Ok(_) | Err(SimError::NoPrimary) => {}
            Err(e) => panic!("replication failed: {}", e),
        }
        assert!(cluster.divergent().is_empty(), "divergence in round {}", round);
    }

    nemesis.inject(&mut cluster, Fault::Heal);
    cluster.view_change().unwrap();
    let act = cluster.members()[0].act_id();
    for m in cluster.members() {
        assert!(m.is_primary());
        assert_eq!(m.status(), NodeState::Synced);
        assert_eq!(m.act_id(), act);
    }
}
