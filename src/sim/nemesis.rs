//! Nemesis - the fault injector for view-change simulation.
//!
//! Between view changes it may:
//! - Partition: split the group in two
//! - Wipe: make a member lose its replicated state
//! - Heal: restore all links

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::info;

use super::cluster::Cluster;

/// Types of faults the Nemesis can inject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Isolate these members from the rest.
    Partition(Vec<u32>),
    /// Wipe the replicated state of one member.
    Wipe(u32),
    /// Heal all network issues.
    Heal,
    /// Do nothing this round.
    Noop,
}

/// Configuration for the Nemesis.
#[derive(Debug, Clone)]
pub struct NemesisConfig {
    /// Probability of injecting a fault each round (0.0 - 1.0).
    pub fault_probability: f64,
    /// Weights for Partition, Wipe, Heal.
    pub fault_weights: [f64; 3],
    /// Seed of the fault schedule.
    pub seed: u64,
}

impl Default for NemesisConfig {
    fn default() -> Self {
        NemesisConfig {
            fault_probability: 0.5,
            fault_weights: [2.0, 0.5, 2.0],
            seed: 0,
        }
    }
}

/// Record of one injected fault.
#[derive(Debug, Clone)]
pub struct FaultEvent {
    /// View that was current when the fault was injected.
    pub view: u64,
    pub fault: Fault,
}

/// Deterministic fault injector.
pub struct Nemesis {
    config: NemesisConfig,
    rng: StdRng,
    history: Vec<FaultEvent>,
}

impl Nemesis {
    pub fn new(config: NemesisConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Nemesis {
            config,
            rng,
            history: Vec::new(),
        }
    }

    /// Pick the fault for the next round.
    ///
    /// An empty group never sees a fault. A single member can't be
    /// partitioned, so only Wipe and Heal are weighed for it.
    pub fn next_fault(&mut self, cluster_size: u32) -> Fault {
        if cluster_size == 0 || self.rng.gen::<f64>() >= self.config.fault_probability {
            return Fault::Noop;
        }

        let [partition, wipe, heal] = self.config.fault_weights;
        let partition = if cluster_size > 1 { partition } else { 0.0 };
        let total = partition + wipe + heal;
        if total <= 0.0 {
            return Fault::Noop;
        }

        let r = self.rng.gen::<f64>() * total;
        if r < partition {
            let mut members: Vec<u32> = (0..cluster_size).collect();
            members.shuffle(&mut self.rng);
            let count = self.rng.gen_range(1..cluster_size) as usize;
            let mut side: Vec<u32> = members.into_iter().take(count).collect();
            side.sort_unstable();
            return Fault::Partition(side);
        }

        if r < partition + wipe {
            return Fault::Wipe(self.rng.gen_range(0..cluster_size));
        }

        Fault::Heal
    }

    /// Inject `fault` into `cluster` and record it.
    pub fn inject(&mut self, cluster: &mut Cluster, fault: Fault) {
        match &fault {
            Fault::Partition(side) => {
                cluster.network().partition(side);
                info!("[NEMESIS] Partitioned {:?} from the rest", side);
            }
            Fault::Wipe(idx) => {
                if let Some(member) = cluster.member_mut(*idx) {
                    member.wipe();
                    info!("[NEMESIS] Wiped state of member {}", idx);
                }
            }
            Fault::Heal => {
                cluster.network().heal();
                info!("[NEMESIS] Healed all network issues");
            }
            Fault::Noop => {}
        }

        self.history.push(FaultEvent {
            view: cluster.view(),
            fault,
        });
    }

    /// Choose and inject the next fault.
    pub fn step(&mut self, cluster: &mut Cluster) -> Fault {
        let fault = self.next_fault(cluster.config().cluster_size);
        self.inject(cluster, fault.clone());
        fault
    }

    pub fn history(&self) -> &[FaultEvent] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::cluster::SimConfig;

    #[test]
    fn test_nemesis_is_deterministic() {
        let config = NemesisConfig {
            seed: 7,
            ..NemesisConfig::default()
        };
        let mut a = Nemesis::new(config.clone());
        let mut b = Nemesis::new(config);
        for _ in 0..50 {
            assert_eq!(a.next_fault(5), b.next_fault(5));
        }
    }

    #[test]
    fn test_partition_side_is_proper_subset() {
        let mut nemesis = Nemesis::new(NemesisConfig {
            fault_probability: 1.0,
            fault_weights: [1.0, 0.0, 0.0],
            seed: 3,
        });
        for _ in 0..50 {
            match nemesis.next_fault(5) {
                Fault::Partition(side) => {
                    assert!(!side.is_empty() && side.len() < 5);
                    assert!(side.iter().all(|&i| i < 5));
                }
                other => panic!("unexpected fault {:?}", other),
            }
        }
    }

    #[test]
    fn test_empty_group_sees_no_fault() {
        let mut nemesis = Nemesis::new(NemesisConfig {
            fault_probability: 1.0,
            ..NemesisConfig::default()
        });
        for _ in 0..50 {
            assert_eq!(nemesis.next_fault(0), Fault::Noop);
        }
    }

    #[test]
    fn test_single_member_is_never_partitioned() {
        let mut nemesis = Nemesis::new(NemesisConfig {
            fault_probability: 1.0,
            fault_weights: [1.0, 0.0, 1.0],
            seed: 11,
        });
        for _ in 0..200 {
            assert_eq!(nemesis.next_fault(1), Fault::Heal);
        }

        let mut nemesis = Nemesis::new(NemesisConfig {
            fault_probability: 1.0,
            fault_weights: [1.0, 0.0, 0.0],
            seed: 11,
        });
        assert_eq!(nemesis.next_fault(1), Fault::Noop);

        let mut nemesis = Nemesis::new(NemesisConfig {
            fault_probability: 1.0,
            fault_weights: [5.0, 1.0, 1.0],
            seed: 5,
        });
        let wipes = (0..1000)
            .filter(|_| nemesis.next_fault(1) == Fault::Wipe(0))
            .count();
        // Wipe and Heal share the draw evenly once Partition is excluded.
        assert!((350..650).contains(&wipes), "wipes = {}", wipes);
    }

    #[test]
    fn test_inject_partition_and_heal() {
        let mut cluster = Cluster::new(SimConfig::default()).unwrap();
        let mut nemesis = Nemesis::new(NemesisConfig::default());

        nemesis.inject(&mut cluster, Fault::Partition(vec![2]));
        assert!(!cluster.network().is_connected(0, 2));
        assert!(cluster.network().is_connected(0, 1));

        nemesis.inject(&mut cluster, Fault::Heal);
        assert!(cluster.network().is_connected(0, 2));
        assert_eq!(nemesis.history().len(), 2);
        assert_eq!(nemesis.history()[0].fault, Fault::Partition(vec![2]));
    }
}
