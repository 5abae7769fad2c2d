use crate::bus::MessageBus;
use crate::consensus::{ConsensusEngine, ConsensusStrategy};
use crate::heartbeat::HeartbeatMonitor;
use crate::pool::AgentPool;
use crate::profiles::default_roster;
use crate::supervisor::{AgentSupervisor, RestartStrategy};
use crate::types::{AgentRole, SwarmAgent};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use swarmforge_core::{SwarmError, SwarmResult};

/// Top-level configuration, usually read from `swarmforge.toml`.
///
/// Every section and field is optional; missing values fall back to the
/// defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwarmConfig {
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    /// Agent roster. Empty means the built-in default roster.
    #[serde(default)]
    pub agents: Vec<AgentEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_dead_after_ms")]
    pub dead_after_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            dead_after_ms: default_dead_after_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_restart_strategy")]
    pub strategy: RestartStrategy,
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    #[serde(default = "default_restart_window_secs")]
    pub restart_window_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            strategy: default_restart_strategy(),
            max_restarts: default_max_restarts(),
            restart_window_secs: default_restart_window_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_slow_handler_ms")]
    pub slow_handler_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            slow_handler_ms: default_slow_handler_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    #[serde(default = "default_consensus_strategy")]
    pub strategy: ConsensusStrategy,
    #[serde(default = "default_quorum")]
    pub quorum: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            strategy: default_consensus_strategy(),
            quorum: default_quorum(),
        }
    }
}

/// One `[[agents]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEntry {
    pub id: String,
    pub role: AgentRole,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,
}

impl AgentEntry {
    pub fn to_agent(&self) -> SwarmAgent {
        SwarmAgent::new(&self.id, self.role)
            .with_capabilities(self.capabilities.iter().cloned())
            .with_max_concurrent(self.max_concurrent)
    }
}

fn default_timeout_ms() -> u64 {
    5_000
}
fn default_dead_after_ms() -> u64 {
    15_000
}
fn default_restart_strategy() -> RestartStrategy {
    RestartStrategy::OneForOne
}
fn default_max_restarts() -> u32 {
    3
}
fn default_restart_window_secs() -> u64 {
    60
}
fn default_max_history() -> usize {
    1_000
}
fn default_slow_handler_ms() -> u64 {
    250
}
fn default_consensus_strategy() -> ConsensusStrategy {
    ConsensusStrategy::Majority
}
fn default_quorum() -> usize {
    1
}
fn default_max_concurrent() -> u32 {
    1
}

impl SwarmConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> SwarmResult<Self> {
        let config: SwarmConfig = toml::from_str(text)
            .map_err(|e| SwarmError::Config(format!("Invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> SwarmResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SwarmError::Config(format!(
                "Failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> SwarmResult<()> {
        if self.heartbeat.timeout_ms == 0 {
            return Err(SwarmError::Config(
                "heartbeat.timeout_ms must be positive".into(),
            ));
        }
        if self.heartbeat.dead_after_ms < self.heartbeat.timeout_ms {
            return Err(SwarmError::Config(format!(
                "heartbeat.dead_after_ms ({}) must be at least timeout_ms ({})",
                self.heartbeat.dead_after_ms, self.heartbeat.timeout_ms
            )));
        }
        if self.supervisor.restart_window_secs == 0 {
            return Err(SwarmError::Config(
                "supervisor.restart_window_secs must be positive".into(),
            ));
        }
        if self.bus.max_history == 0 {
            return Err(SwarmError::Config("bus.max_history must be positive".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.id.as_str()) {
                return Err(SwarmError::Config(format!(
                    "duplicate agent id '{}'",
                    agent.id
                )));
            }
        }
        Ok(())
    }

    /// Configured agents, or the default roster when none are listed.
    pub fn roster(&self) -> Vec<SwarmAgent> {
        if self.agents.is_empty() {
            default_roster()
        } else {
            self.agents.iter().map(AgentEntry::to_agent).collect()
        }
    }

    pub fn build_pool(&self) -> AgentPool {
        AgentPool::with_agents(self.roster())
    }

    pub fn build_bus(&self) -> MessageBus {
        MessageBus::with_limits(
            self.bus.max_history,
            Duration::from_millis(self.bus.slow_handler_ms),
        )
    }

    pub fn build_heartbeat(&self) -> HeartbeatMonitor {
        HeartbeatMonitor::new(Duration::from_millis(self.heartbeat.timeout_ms))
            .with_dead_after(Duration::from_millis(self.heartbeat.dead_after_ms))
    }

    pub fn build_supervisor(&self) -> AgentSupervisor {
        AgentSupervisor::new(
            self.supervisor.strategy,
            self.supervisor.max_restarts,
            Duration::from_secs(self.supervisor.restart_window_secs),
        )
    }

    pub fn build_consensus(&self) -> ConsensusEngine {
        ConsensusEngine::new(self.consensus.strategy).with_quorum(self.consensus.quorum)
    }
}
