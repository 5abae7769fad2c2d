//! Fault-tolerant coordination for a pool of worker agents.
//!
//! Splits free-text work into dependency-ordered sub-tasks, assigns them to
//! agents by role, capability and load, resolves multi-agent votes, moves
//! events over an in-process topic bus, and recovers crashed agents through
//! supervision-tree restart policies.
//!
//! # Main types
//!
//! - [`decompose`] / [`TaskGraph`]: Sub-task chains and topological ordering.
//! - [`AgentPool`]: Role/capability/load-aware assignment.
//! - [`ConsensusEngine`]: Majority, weighted and veto voting.
//! - [`MessageBus`]: Topic pub/sub with `*` / `#` wildcards and bounded history.
//! - [`HeartbeatMonitor`]: Pull-based liveness tracking.
//! - [`AgentSupervisor`]: Restart-or-escalate decisions over a sliding window.
//! - [`ProcessOrchestrator`]: Agent lifecycle with crash-driven recovery.
//! - [`Watchdog`]: Optional background task that reports silent agents.
//! - [`SwarmConfig`]: TOML configuration for all of the above.

/// In-process topic message bus.
///
/// Topics are `.`-separated (`task.completed`). Patterns may use `*` for
/// exactly one segment and `#` as the last segment for one or more
/// trailing segments.
pub mod bus;
/// TOML configuration.
pub mod config;
/// Vote resolution. An empty or sub-quorum vote set is always a deadlock.
pub mod consensus;
/// Free-text task decomposition.
pub mod decomposer;
/// Agent liveness tracking.
pub mod heartbeat;
/// Worker agent registry and assignment.
pub mod pool;
/// Agent lifecycle control.
pub mod process;
/// Default agent roster.
pub mod profiles;
/// Restart policy. The supervisor only decides; the process orchestrator
/// acts on its verdicts.
pub mod supervisor;
/// Sub-task dependency graph.
pub mod task_graph;
/// Shared types (SubTask, SwarmAgent, AgentRole, etc.).
pub mod types;
/// Background liveness sweeps.
pub mod watchdog;

pub use bus::{BusRecord, Handler, MessageBus, TopicPattern};
pub use config::{AgentEntry, SwarmConfig};
pub use consensus::{
    resolve, ConsensusEngine, ConsensusResult, ConsensusStrategy, Decision, Vote,
};
pub use decomposer::decompose;
pub use heartbeat::{HealthStatus, HeartbeatMonitor, HeartbeatRecord};
pub use pool::{AgentPool, PoolStatus};
pub use process::{
    AgentProcessRecord, HealthSummary, ProcessOrchestrator, ProcessState, RecoveryReport,
    SpawnConfig,
};
pub use profiles::default_roster;
pub use supervisor::{restart_targets, AgentSupervisor, RestartStrategy, SupervisorAction};
pub use task_graph::{execution_order, leaf_tasks, TaskGraph};
pub use types::{AgentRole, SubTask, SwarmAgent, TaskStatus};
pub use watchdog::Watchdog;
