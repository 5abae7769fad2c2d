use crate::bus::MessageBus;
use crate::config::SwarmConfig;
use crate::heartbeat::{HealthStatus, HeartbeatMonitor};
use crate::pool::AgentPool;
use crate::supervisor::{AgentSupervisor, SupervisorAction};
use crate::types::{AgentRole, SwarmAgent};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use swarmforge_core::{SwarmError, SwarmMessage, SwarmResult};
use tracing::{info, warn};

const SENDER: &str = "process-orchestrator";

/// Lifecycle state of a spawned agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Running,
    Stopped,
    Crashed,
}

/// What to spawn. The orchestrator only tracks identity and shape; the
/// caller's runtime does the actual work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnConfig {
    pub role: AgentRole,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    pub max_concurrent: u32,
    /// Opaque settings handed through to the runtime.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            role: AgentRole::Coder,
            capabilities: BTreeSet::new(),
            max_concurrent: 1,
            metadata: serde_json::Value::Null,
        }
    }
}

impl SpawnConfig {
    pub fn for_role(role: AgentRole) -> Self {
        Self {
            role,
            ..Self::default()
        }
    }
}

impl From<&SwarmAgent> for SpawnConfig {
    fn from(agent: &SwarmAgent) -> Self {
        Self {
            role: agent.role,
            capabilities: agent.capabilities.clone(),
            max_concurrent: agent.max_concurrent,
            metadata: serde_json::Value::Null,
        }
    }
}

/// Bookkeeping for one spawned agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentProcessRecord {
    pub agent_id: String,
    pub agent_type: String,
    pub config: SpawnConfig,
    pub state: ProcessState,
    /// Incremented on every respawn; the first instance is generation 1.
    pub generation: u32,
    pub spawned_at: DateTime<Utc>,
    pub last_crash: Option<String>,
}

/// Aggregate lifecycle counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub total: usize,
    pub running: usize,
    pub stopped: usize,
    pub crashed: usize,
}

/// What happened in response to a crash report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub agent_id: String,
    pub action: SupervisorAction,
    /// Agents respawned as a result, crashed agent first when it restarted.
    pub restarted: Vec<String>,
}

/// Top-level lifecycle controller.
///
/// Owns the agent records and is the only component that changes the
/// supervisor, the heartbeat monitor and the records together. The record
/// lock is held for the whole joint update; bus events go out after it is
/// released.
pub struct ProcessOrchestrator {
    supervisor: AgentSupervisor,
    heartbeat: HeartbeatMonitor,
    records: Mutex<Vec<AgentProcessRecord>>,
    bus: Option<Arc<MessageBus>>,
    pool: Option<Arc<AgentPool>>,
}

impl ProcessOrchestrator {
    pub fn new(supervisor: AgentSupervisor, heartbeat: HeartbeatMonitor) -> Self {
        Self {
            supervisor,
            heartbeat,
            records: Mutex::new(Vec::new()),
            bus: None,
            pool: None,
        }
    }

    pub fn from_config(config: &SwarmConfig) -> Self {
        Self::new(config.build_supervisor(), config.build_heartbeat())
    }

    /// Publish lifecycle events (`agent.spawned`, `agent.restarted`, ...) on `bus`.
    pub fn with_bus(mut self, bus: Arc<MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Free an agent's pool slots whenever its instance dies (respawn or escalation).
    pub fn with_pool(mut self, pool: Arc<AgentPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn supervisor(&self) -> &AgentSupervisor {
        &self.supervisor
    }

    pub fn heartbeat(&self) -> &HeartbeatMonitor {
        &self.heartbeat
    }

    /// Spawn an agent under a generated id (`<type>-<n>`).
    pub fn spawn(&self, agent_type: &str, config: SpawnConfig) -> String {
        let mut records = self.records.lock();
        let prefix = agent_type.to_lowercase();
        let mut n = records.len() + 1;
        let mut agent_id = format!("{prefix}-{n}");
        // Named spawns may already hold the obvious id.
        while records.iter().any(|r| r.agent_id == agent_id) {
            n += 1;
            agent_id = format!("{prefix}-{n}");
        }
        self.start_locked(&mut records, &agent_id, agent_type, config);
        drop(records);
        self.emit("agent.spawned", &agent_id, serde_json::json!({ "agent_type": agent_type }));
        agent_id
    }

    /// Spawn an agent under a caller-chosen id.
    ///
    /// A stopped agent with the same id is brought back as a new
    /// generation; a running or crashed one is rejected.
    pub fn spawn_named(
        &self,
        agent_id: &str,
        agent_type: &str,
        config: SpawnConfig,
    ) -> SwarmResult<String> {
        let mut records = self.records.lock();
        if let Some(existing) = records.iter().find(|r| r.agent_id == agent_id) {
            if existing.state != ProcessState::Stopped {
                return Err(SwarmError::DuplicateAgent(agent_id.to_string()));
            }
        }
        self.start_locked(&mut records, agent_id, agent_type, config);
        drop(records);
        self.emit("agent.spawned", agent_id, serde_json::json!({ "agent_type": agent_type }));
        Ok(agent_id.to_string())
    }

    /// Stop an agent and remove it from supervision and liveness tracking.
    pub fn shutdown(&self, agent_id: &str) -> SwarmResult<()> {
        {
            let mut records = self.records.lock();
            let record = records
                .iter_mut()
                .find(|r| r.agent_id == agent_id)
                .ok_or_else(|| SwarmError::UnknownAgent(agent_id.to_string()))?;
            record.state = ProcessState::Stopped;
            self.supervisor.unregister(agent_id);
            self.heartbeat.unregister(agent_id);
        }
        info!(agent_id = %agent_id, "Agent stopped");
        self.emit("agent.stopped", agent_id, serde_json::Value::Null);
        Ok(())
    }

    /// Handle a crash notification from the runtime.
    ///
    /// On restart every agent the supervisor names (that is still running,
    /// plus the crashed one) comes back as a fresh generation under the same
    /// id. On escalation the agent is left crashed and out of liveness
    /// tracking until someone calls [`restart`](Self::restart); further
    /// reports for it escalate again without touching the supervisor.
    pub fn report_crash(&self, agent_id: &str, reason: &str) -> SwarmResult<RecoveryReport> {
        let report = {
            let mut records = self.records.lock();
            let record = records
                .iter_mut()
                .find(|r| r.agent_id == agent_id && r.state != ProcessState::Stopped)
                .ok_or_else(|| SwarmError::UnknownAgent(agent_id.to_string()))?;
            let already_escalated = record.state == ProcessState::Crashed;
            record.state = ProcessState::Crashed;
            record.last_crash = Some(reason.to_string());

            // An escalated agent waits for a manual restart, however old its crashes are.
            let action = if already_escalated {
                SupervisorAction::Escalate
            } else {
                self.supervisor.on_agent_crash(agent_id, reason)
            };
            let mut restarted = Vec::new();
            match action {
                SupervisorAction::Restart => {
                    for target in self.supervisor.agents_to_restart(agent_id) {
                        let Some(record) = records.iter_mut().find(|r| r.agent_id == target) else {
                            continue;
                        };
                        let is_crashed_agent = target == agent_id;
                        if !is_crashed_agent && record.state != ProcessState::Running {
                            continue;
                        }
                        record.state = ProcessState::Running;
                        record.generation += 1;
                        record.spawned_at = Utc::now();
                        self.heartbeat.register(&target);
                        self.release_slots(&target);
                        info!(
                            agent_id = %target,
                            generation = record.generation,
                            crashed = %agent_id,
                            "Agent respawned"
                        );
                        if is_crashed_agent {
                            restarted.insert(0, target);
                        } else {
                            restarted.push(target);
                        }
                    }
                }
                SupervisorAction::Escalate => {
                    self.heartbeat.unregister(agent_id);
                    self.release_slots(agent_id);
                    warn!(agent_id = %agent_id, reason, "Automatic recovery exhausted");
                }
            }
            RecoveryReport {
                agent_id: agent_id.to_string(),
                action,
                restarted,
            }
        };

        self.emit(
            "agent.crashed",
            agent_id,
            serde_json::json!({ "reason": reason }),
        );
        match report.action {
            SupervisorAction::Restart => self.emit(
                "agent.restarted",
                agent_id,
                serde_json::json!({ "restarted": report.restarted }),
            ),
            SupervisorAction::Escalate => self.emit(
                "agent.escalated",
                agent_id,
                serde_json::json!({ "reason": reason }),
            ),
        }
        Ok(report)
    }

    /// Manually bring back a crashed (escalated) agent with a clean crash history.
    pub fn restart(&self, agent_id: &str) -> SwarmResult<()> {
        {
            let mut records = self.records.lock();
            let record = records
                .iter_mut()
                .find(|r| r.agent_id == agent_id && r.state == ProcessState::Crashed)
                .ok_or_else(|| SwarmError::UnknownAgent(agent_id.to_string()))?;
            record.state = ProcessState::Running;
            record.generation += 1;
            record.spawned_at = Utc::now();
            self.supervisor.reset(agent_id);
            self.heartbeat.register(agent_id);
            info!(agent_id = %agent_id, generation = record.generation, "Agent manually restarted");
        }
        self.emit("agent.restarted", agent_id, serde_json::json!({ "manual": true }));
        Ok(())
    }

    /// Forward a liveness beat for a running agent.
    pub fn beat(&self, agent_id: &str) -> SwarmResult<()> {
        let records = self.records.lock();
        if !records
            .iter()
            .any(|r| r.agent_id == agent_id && r.state == ProcessState::Running)
        {
            return Err(SwarmError::UnknownAgent(agent_id.to_string()));
        }
        self.heartbeat.beat(agent_id);
        Ok(())
    }

    /// Running agents whose heartbeat has gone dead.
    pub fn check_liveness(&self) -> Vec<String> {
        self.check_liveness_at(Instant::now())
    }

    pub fn check_liveness_at(&self, now: Instant) -> Vec<String> {
        let records = self.records.lock();
        records
            .iter()
            .filter(|r| r.state == ProcessState::Running)
            .filter(|r| self.heartbeat.check_at(&r.agent_id, now) == HealthStatus::Dead)
            .map(|r| r.agent_id.clone())
            .collect()
    }

    pub fn agent(&self, agent_id: &str) -> Option<AgentProcessRecord> {
        self.records
            .lock()
            .iter()
            .find(|r| r.agent_id == agent_id)
            .cloned()
    }

    /// Snapshot of all records in spawn order.
    pub fn agents(&self) -> Vec<AgentProcessRecord> {
        self.records.lock().clone()
    }

    pub fn health(&self) -> HealthSummary {
        let records = self.records.lock();
        let count = |state: ProcessState| records.iter().filter(|r| r.state == state).count();
        HealthSummary {
            total: records.len(),
            running: count(ProcessState::Running),
            stopped: count(ProcessState::Stopped),
            crashed: count(ProcessState::Crashed),
        }
    }

    fn start_locked(
        &self,
        records: &mut Vec<AgentProcessRecord>,
        agent_id: &str,
        agent_type: &str,
        config: SpawnConfig,
    ) {
        let previous = records.iter().position(|r| r.agent_id == agent_id);
        let generation = previous.map_or(1, |i| records[i].generation + 1);
        let record = AgentProcessRecord {
            agent_id: agent_id.to_string(),
            agent_type: agent_type.to_string(),
            config,
            state: ProcessState::Running,
            generation,
            spawned_at: Utc::now(),
            last_crash: None,
        };
        match previous {
            Some(i) => records[i] = record,
            None => records.push(record),
        }
        self.supervisor.register(agent_id);
        self.heartbeat.register(agent_id);
        info!(agent_id = %agent_id, agent_type = %agent_type, generation, "Agent spawned");
    }

    /// Tasks held by a dead instance never complete, so its slots go back.
    fn release_slots(&self, agent_id: &str) {
        if let Some(pool) = &self.pool {
            let freed = pool.release_all(agent_id);
            if freed > 0 {
                info!(agent_id = %agent_id, freed, "Released slots of crashed instance");
            }
        }
    }

    fn emit(&self, topic: &str, agent_id: &str, detail: serde_json::Value) {
        if let Some(bus) = &self.bus {
            let payload = serde_json::json!({ "agent_id": agent_id, "detail": detail });
            bus.publish(topic, SwarmMessage::status(SENDER, payload));
        }
    }
}
