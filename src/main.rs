use std::env;
use std::process;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use chr_gcs::sim::{Cluster, Fault, Nemesis, NemesisConfig, SimConfig, SimError};

const DEFAULT_NODES: u32 = 5;
const DEFAULT_ROUNDS: u32 = 20;
const ACTIONS_PER_ROUND: u32 = 3;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = env::args().collect();

    match parse_command(&args) {
        Ok(Command::Run { nodes, rounds, seed }) => run(nodes, rounds, seed),
        Ok(Command::Help) => print_usage(),
        Err(msg) => {
            eprintln!("{}", msg);
            print_usage();
            process::exit(2);
        }
    }
}

/// Commands accepted on the command line.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run { nodes: u32, rounds: u32, seed: u64 },
    Help,
}

/// Parse `args` (program name first). Errors carry the message to print
/// before exiting with status 2.
fn parse_command(args: &[String]) -> Result<Command, String> {
    match args.get(1).map(String::as_str) {
        None => Ok(Command::Run {
            nodes: DEFAULT_NODES,
            rounds: DEFAULT_ROUNDS,
            seed: 0,
        }),
        Some("run") => Ok(Command::Run {
            nodes: parse_arg(args, 2, DEFAULT_NODES)?,
            rounds: parse_arg(args, 3, DEFAULT_ROUNDS)?,
            seed: parse_arg(args, 4, 0u64)?,
        }),
        Some("help") => Ok(Command::Help),
        Some(other) => Err(format!("Unknown command '{}'", other)),
    }
}

fn print_usage() {
    eprintln!("Usage: chr-gcs [command]");
    eprintln!("Commands:");
    eprintln!("  run [nodes] [rounds] [seed] - Simulate view changes under faults");
    eprintln!("  help                        - Show this message");
    eprintln!("  (none)                      - Same as 'run'");
}

fn parse_arg<T: std::str::FromStr>(args: &[String], idx: usize, default: T) -> Result<T, String> {
    match args.get(idx) {
        Some(raw) => raw.parse().map_err(|_| format!("Invalid argument '{}'", raw)),
        None => Ok(default),
    }
}

/// Run the simulation; exits non-zero on the first violated invariant.
fn run(nodes: u32, rounds: u32, seed: u64) {
    info!(
        "=== chr-gcs view change simulation: {} nodes, {} rounds, seed {} ===",
        nodes, rounds, seed
    );

    let mut cluster = match Cluster::new(SimConfig {
        cluster_size: nodes,
        ..SimConfig::default()
    }) {
        Ok(c) => c,
        Err(e) => {
            error!("FATAL: {}", e);
            process::exit(1);
        }
    };

    let mut nemesis = Nemesis::new(NemesisConfig {
        seed,
        ..NemesisConfig::default()
    });

    for round in 0..rounds {
        if round > 0 {
            nemesis.step(&mut cluster);
        }
        if let Err(e) = run_round(&mut cluster, round) {
            error!("FATAL: round {}: {}", round, e);
            process::exit(1);
        }
    }

    nemesis.inject(&mut cluster, Fault::Heal);
    if let Err(e) = run_round(&mut cluster, rounds) {
        error!("FATAL: final round: {}", e);
        process::exit(1);
    }

    for m in cluster.members() {
        info!(
            "  member {}: {} act_id={} primary={}",
            m.idx,
            m.status(),
            m.act_id(),
            m.is_primary()
        );
    }
    info!(
        "=== Simulation complete: {} views, {} faults injected ===",
        cluster.view(),
        nemesis
            .history()
            .iter()
            .filter(|e| e.fault != Fault::Noop)
            .count()
    );
}

fn run_round(cluster: &mut Cluster, round: u32) -> Result<(), SimError> {
    let report = cluster.view_change()?;
    let primaries = report.members.iter().filter(|m| m.primary).count();
    info!(
        "View {}: {}/{} members in primary component",
        report.view,
        primaries,
        report.members.len()
    );

    if !report.agreement() {
        error!("FATAL: members of one component disagree in view {}", report.view);
        process::exit(1);
    }

    for i in 0..ACTIONS_PER_ROUND {
        match cluster.replicate(format!("action-{}-{}", round, i).as_bytes()) {
            Ok(_) => {}
            Err(SimError::NoPrimary) => {
                warn!("View {}: no primary component, nothing replicated", report.view);
                break;
            }
            Err(e) => return Err(e),
        }
    }

    let divergent = cluster.divergent();
    if !divergent.is_empty() {
        error!("FATAL: members {:?} diverged in view {}", divergent, report.view);
        process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_command_runs_defaults() {
        assert_eq!(
            parse_command(&args(&["chr-gcs"])),
            Ok(Command::Run {
                nodes: DEFAULT_NODES,
                rounds: DEFAULT_ROUNDS,
                seed: 0,
            })
        );
    }

    #[test]
    fn test_run_with_arguments() {
        assert_eq!(
            parse_command(&args(&["chr-gcs", "run", "3", "7", "42"])),
            Ok(Command::Run {
                nodes: 3,
                rounds: 7,
                seed: 42,
            })
        );
        assert!(parse_command(&args(&["chr-gcs", "run", "three"])).is_err());
    }

    #[test]
    fn test_help_and_unknown_command() {
        assert_eq!(parse_command(&args(&["chr-gcs", "help"])), Ok(Command::Help));
        assert_eq!(
            parse_command(&args(&["chr-gcs", "frobnicate"])),
            Err("Unknown command 'frobnicate'".to_string())
        );
    }
}
