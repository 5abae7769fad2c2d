use thiserror::Error;
use uuid::Uuid;

/// A convenience `Result` alias using [`SwarmError`].
pub type SwarmResult<T> = Result<T, SwarmError>;

/// Why the pool could not hand a task to any agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentFailure {
    /// No registered agent has the required role and capabilities.
    NoEligibleAgent,
    /// Eligible agents exist but every one of them is at `max_concurrent`.
    AtCapacity,
}

impl std::fmt::Display for AssignmentFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignmentFailure::NoEligibleAgent => write!(f, "no eligible agent"),
            AssignmentFailure::AtCapacity => write!(f, "all eligible agents at capacity"),
        }
    }
}

/// Top-level error type for SwarmForge.
///
/// Capacity problems, malformed task graphs and lifecycle misuse are
/// separate variants so callers can match on them instead of parsing
/// messages. Supervisor escalation is not an error; it is returned as
/// a `SupervisorAction`.
#[derive(Error, Debug)]
pub enum SwarmError {
    /// No agent could take the task right now.
    #[error("Assignment error for task {task_id}: {reason}")]
    Assignment {
        /// The task that could not be placed.
        task_id: Uuid,
        /// Whether no agent qualifies at all, or all qualifying agents are busy.
        reason: AssignmentFailure,
    },

    /// The task graph contains a cycle.
    #[error("Cyclic dependency among tasks: {}", join_ids(.tasks))]
    CyclicDependency {
        /// Tasks that could not be ordered.
        tasks: Vec<Uuid>,
    },

    /// A task depends on an id that is not part of the same batch.
    #[error("Task {task_id} depends on unknown task {dependency}")]
    MissingDependency {
        /// The task holding the dangling edge.
        task_id: Uuid,
        /// The id that does not resolve.
        dependency: Uuid,
    },

    /// A subscription pattern or publish topic is malformed.
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// A lifecycle call referenced an agent that was never spawned.
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// An agent with this id is already live.
    #[error("Agent already running: {0}")]
    DuplicateAgent(String),

    /// A message bus handler rejected a message.
    #[error("Handler error: {0}")]
    Handler(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SwarmError {
    /// Returns `true` when retrying later (or with relaxed requirements) may succeed.
    ///
    /// Only capacity exhaustion qualifies; graph and config errors must be
    /// fixed by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SwarmError::Assignment {
                reason: AssignmentFailure::AtCapacity,
                ..
            }
        )
    }
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
