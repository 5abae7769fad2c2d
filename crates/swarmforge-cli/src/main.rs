use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use swarmforge_orchestrator::{
    decompose, execution_order, ConsensusStrategy, ProcessOrchestrator, ProcessState,
    SpawnConfig, SwarmConfig, Vote,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "swarmforge.toml";

#[derive(Parser)]
#[command(name = "swarmforge", about = "SwarmForge - fault-tolerant agent orchestration")]
struct Cli {
    /// Path to config file (defaults to ./swarmforge.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompose a task and show the assignment plan
    Plan {
        /// Free-text task description
        description: String,
    },
    /// Resolve a set of votes
    Vote {
        /// majority, weighted or veto (overrides config)
        #[arg(short, long)]
        strategy: Option<ConsensusStrategy>,
        /// Votes as voter:approve[:weight], e.g. reviewer-1:yes:2
        #[arg(required = true)]
        votes: Vec<String>,
    },
    /// Spawn the roster and inject crashes
    Simulate {
        /// Number of crashes to inject
        #[arg(long, default_value_t = 3)]
        crashes: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Plan { description } => plan(&config, &description),
        Commands::Vote { strategy, votes } => vote(&config, strategy, &votes),
        Commands::Simulate { crashes } => simulate(&config, crashes),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SwarmConfig> {
    match path {
        Some(path) => Ok(SwarmConfig::load(path)?),
        None if Path::new(DEFAULT_CONFIG).exists() => Ok(SwarmConfig::load(DEFAULT_CONFIG)?),
        None => {
            debug!("No config file, using defaults");
            Ok(SwarmConfig::default())
        }
    }
}

fn plan(config: &SwarmConfig, description: &str) -> anyhow::Result<()> {
    let subtasks = decompose(description);
    let order = execution_order(&subtasks)?;
    let pool = config.build_pool();
    info!(subtasks = subtasks.len(), agents = pool.len(), "Planning");

    println!("Plan for: {description}");
    for (step, id) in order.iter().enumerate() {
        let Some(task) = subtasks.iter().find(|t| t.id == *id) else {
            continue;
        };
        let agent = match pool.peek(task) {
            Ok(agent) => agent.agent_id,
            Err(e) => format!("unassigned ({e})"),
        };
        let after: Vec<usize> = task
            .depends_on
            .iter()
            .filter_map(|dep| order.iter().position(|o| o == dep))
            .map(|i| i + 1)
            .collect();
        print!("  {}. [{}] {} -> {}", step + 1, task.required_role, task.description, agent);
        if !after.is_empty() {
            print!(" (after {after:?})");
        }
        println!();
    }
    Ok(())
}

fn vote(
    config: &SwarmConfig,
    strategy: Option<ConsensusStrategy>,
    raw: &[String],
) -> anyhow::Result<()> {
    let votes = raw
        .iter()
        .map(|v| parse_vote(v))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let engine = config.build_consensus();
    let strategy = strategy.unwrap_or(engine.strategy());
    let result = engine.resolve(votes, strategy);

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Parse `voter:approve[:weight]`.
fn parse_vote(raw: &str) -> anyhow::Result<Vote> {
    let mut parts = raw.split(':');
    let voter = parts.next().filter(|v| !v.is_empty());
    let approve = parts.next();
    let weight = parts.next();
    if parts.next().is_some() {
        bail!("too many fields in vote '{raw}'");
    }
    let (Some(voter), Some(approve)) = (voter, approve) else {
        bail!("vote '{raw}' must look like voter:approve[:weight]");
    };

    let approve = match approve.to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "approve" => true,
        "no" | "n" | "false" | "reject" => false,
        other => bail!("unrecognised approval '{other}' in vote '{raw}'"),
    };
    match weight {
        Some(w) => {
            let w: f64 = w
                .parse()
                .with_context(|| format!("invalid weight in vote '{raw}'"))?;
            if !w.is_finite() || w < 0.0 {
                bail!("weight in vote '{raw}' must be a finite non-negative number");
            }
            Ok(Vote::weighted(voter, approve, w))
        }
        None => Ok(Vote::new(voter, approve)),
    }
}

fn simulate(config: &SwarmConfig, crashes: usize) -> anyhow::Result<()> {
    let bus = Arc::new(config.build_bus());
    bus.subscribe("cli", "agent.#", |msg| {
        debug!(sender = %msg.sender(), payload = %msg.payload(), "Lifecycle event");
        Ok(())
    })?;
    let orchestrator =
        ProcessOrchestrator::from_config(config).with_bus(Arc::clone(&bus));

    for agent in config.roster() {
        orchestrator.spawn_named(
            &agent.agent_id,
            &agent.role.to_string(),
            SpawnConfig::from(&agent),
        )?;
    }
    info!(agents = orchestrator.agents().len(), crashes, "Simulation started");

    for i in 0..crashes {
        let running: Vec<String> = orchestrator
            .agents()
            .into_iter()
            .filter(|r| r.state == ProcessState::Running)
            .map(|r| r.agent_id)
            .collect();
        if running.is_empty() {
            println!("No running agents left after {i} crash(es)");
            break;
        }
        let victim = &running[i % running.len()];
        let report = orchestrator.report_crash(victim, "simulated crash")?;
        println!(
            "crash #{}: {} -> {:?} (restarted: {})",
            i + 1,
            report.agent_id,
            report.action,
            report.restarted.join(", ")
        );
    }

    let health = orchestrator.health();
    println!(
        "health: total={} running={} stopped={} crashed={}",
        health.total, health.running, health.stopped, health.crashed
    );
    println!("bus events: {}", bus.history_len());
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_vote_forms() {
        let v = parse_vote("reviewer-1:yes").unwrap();
        assert_eq!(v.voter, "reviewer-1");
        assert!(v.approve);
        assert_eq!(v.weight, 1.0);

        let v = parse_vote("tester-1:reject:2.5").unwrap();
        assert!(!v.approve);
        assert_eq!(v.weight, 2.5);
    }

    #[test]
    fn test_parse_vote_rejects_garbage() {
        for raw in [
            "",
            "alice",
            ":yes",
            "alice:maybe",
            "alice:yes:heavy",
            "a:yes:1:extra",
            "a:yes:inf",
            "a:yes:1e309",
            "a:yes:NaN",
            "a:yes:-2",
        ] {
            assert!(parse_vote(raw).is_err(), "accepted: {raw:?}");
        }
    }

    #[test]
    fn test_load_config_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[consensus]\nstrategy = \"veto\"").unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.consensus.strategy, ConsensusStrategy::Veto);
    }

    #[test]
    fn test_load_config_missing_explicit_path_fails() {
        assert!(load_config(Some(Path::new("/no/such/swarmforge.toml"))).is_err());
    }

    #[test]
    fn test_commands_run_on_defaults() {
        let config = SwarmConfig::default();
        plan(&config, "design and implement a cache").unwrap();
        vote(&config, None, &["a:yes".into(), "b:no".into(), "c:yes".into()]).unwrap();
        simulate(&config, 4).unwrap();
    }
}
