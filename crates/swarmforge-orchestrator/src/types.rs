use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use uuid::Uuid;

/// Role of each agent in the swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Splits work, routes results, drives reviews.
    Coordinator,
    /// Produces designs and interface plans.
    Architect,
    /// Writes the implementation.
    Coder,
    /// Writes and runs tests.
    Tester,
    /// Reviews work for quality and correctness.
    Reviewer,
    /// Gathers background information.
    Researcher,
}

impl AgentRole {
    /// Every role, in pipeline order.
    pub const ALL: [AgentRole; 6] = [
        AgentRole::Coordinator,
        AgentRole::Architect,
        AgentRole::Coder,
        AgentRole::Tester,
        AgentRole::Reviewer,
        AgentRole::Researcher,
    ];
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentRole::Coordinator => write!(f, "coordinator"),
            AgentRole::Architect => write!(f, "architect"),
            AgentRole::Coder => write!(f, "coder"),
            AgentRole::Tester => write!(f, "tester"),
            AgentRole::Reviewer => write!(f, "reviewer"),
            AgentRole::Researcher => write!(f, "researcher"),
        }
    }
}

/// Status of a sub-task as it moves through the swarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Running,
    Completed,
    Failed { reason: String },
}

impl TaskStatus {
    /// Completed and failed tasks never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed { .. })
    }
}

/// A unit of work produced by the decomposer (or written by hand).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    pub id: Uuid,
    pub description: String,
    pub required_role: AgentRole,
    #[serde(default)]
    pub required_capabilities: BTreeSet<String>,
    /// Tasks in the same batch that must complete first.
    #[serde(default)]
    pub depends_on: Vec<Uuid>,
    pub status: TaskStatus,
    /// Agent the pool handed this task to.
    #[serde(default)]
    pub assigned_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SubTask {
    pub fn new(description: impl Into<String>, required_role: AgentRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            required_role,
            required_capabilities: BTreeSet::new(),
            depends_on: Vec::new(),
            status: TaskStatus::Pending,
            assigned_agent: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn with_capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_capabilities = caps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<Uuid>) -> Self {
        self.depends_on = deps;
        self
    }

    /// Pending with every dependency already completed.
    pub fn is_ready(&self, completed: &HashSet<Uuid>) -> bool {
        self.status == TaskStatus::Pending
            && self.depends_on.iter().all(|dep| completed.contains(dep))
    }
}

/// A worker agent as tracked by the pool.
///
/// `active_tasks` is only changed by the pool on assign/release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmAgent {
    pub agent_id: String,
    pub role: AgentRole,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    pub max_concurrent: u32,
    #[serde(default, skip_deserializing)]
    pub(crate) active_tasks: u32,
}

impl SwarmAgent {
    pub fn new(agent_id: impl Into<String>, role: AgentRole) -> Self {
        Self {
            agent_id: agent_id.into(),
            role,
            capabilities: BTreeSet::new(),
            max_concurrent: 1,
            active_tasks: 0,
        }
    }

    pub fn with_capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = caps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_concurrent(mut self, max: u32) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Number of tasks currently held by this agent.
    pub fn active_tasks(&self) -> u32 {
        self.active_tasks
    }

    /// Whether the agent can take one more task.
    pub fn available(&self) -> bool {
        self.active_tasks < self.max_concurrent
    }

    /// Fraction of capacity in use. Zero-capacity agents report full load.
    pub fn load(&self) -> f64 {
        if self.max_concurrent == 0 {
            return 1.0;
        }
        f64::from(self.active_tasks) / f64::from(self.max_concurrent)
    }

    /// Role matches exactly and every required capability is present.
    pub fn is_eligible(&self, task: &SubTask) -> bool {
        self.role == task.required_role
            && task.required_capabilities.is_subset(&self.capabilities)
    }
}
