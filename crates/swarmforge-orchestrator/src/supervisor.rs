use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Which agents restart together when one crashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartStrategy {
    /// Only the crashed agent.
    OneForOne,
    /// Every supervised agent.
    OneForAll,
    /// The crashed agent and everything registered after it.
    RestForOne,
}

impl std::fmt::Display for RestartStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestartStrategy::OneForOne => write!(f, "one_for_one"),
            RestartStrategy::OneForAll => write!(f, "one_for_all"),
            RestartStrategy::RestForOne => write!(f, "rest_for_one"),
        }
    }
}

/// The supervisor's verdict on a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorAction {
    /// Recovery is automatic.
    Restart,
    /// Too many crashes inside the window; a human or parent must step in.
    Escalate,
}

/// Agents to restart for a crash of `crashed`, given registration `order`.
///
/// An agent the supervisor never saw only restarts itself.
pub fn restart_targets(strategy: RestartStrategy, order: &[String], crashed: &str) -> Vec<String> {
    let Some(position) = order.iter().position(|id| id == crashed) else {
        return vec![crashed.to_string()];
    };
    match strategy {
        RestartStrategy::OneForOne => vec![crashed.to_string()],
        RestartStrategy::OneForAll => order.to_vec(),
        RestartStrategy::RestForOne => order[position..].to_vec(),
    }
}

struct SupervisorState {
    order: Vec<String>,
    crashes: HashMap<String, VecDeque<Instant>>,
}

/// Decides restart-vs-escalate from crash frequency inside a sliding window.
pub struct AgentSupervisor {
    strategy: RestartStrategy,
    max_restarts: u32,
    restart_window: Duration,
    state: Mutex<SupervisorState>,
}

impl AgentSupervisor {
    pub fn new(strategy: RestartStrategy, max_restarts: u32, restart_window: Duration) -> Self {
        Self {
            strategy,
            max_restarts,
            restart_window,
            state: Mutex::new(SupervisorState {
                order: Vec::new(),
                crashes: HashMap::new(),
            }),
        }
    }

    pub fn strategy(&self) -> RestartStrategy {
        self.strategy
    }

    pub fn max_restarts(&self) -> u32 {
        self.max_restarts
    }

    pub fn restart_window(&self) -> Duration {
        self.restart_window
    }

    /// Start supervising an agent. Registering twice keeps the first position.
    pub fn register(&self, agent_id: &str) {
        let mut state = self.state.lock();
        if !state.order.iter().any(|id| id == agent_id) {
            state.order.push(agent_id.to_string());
            state.crashes.insert(agent_id.to_string(), VecDeque::new());
        }
    }

    pub fn unregister(&self, agent_id: &str) -> bool {
        let mut state = self.state.lock();
        let before = state.order.len();
        state.order.retain(|id| id != agent_id);
        state.crashes.remove(agent_id);
        state.order.len() != before
    }

    pub fn on_agent_crash(&self, agent_id: &str, reason: &str) -> SupervisorAction {
        self.on_agent_crash_at(agent_id, reason, Instant::now())
    }

    /// Count a crash at `now` and decide what to do about it.
    ///
    /// Crashes older than the restart window are forgotten first, so only
    /// recent instability leads to escalation.
    pub fn on_agent_crash_at(&self, agent_id: &str, reason: &str, now: Instant) -> SupervisorAction {
        let mut state = self.state.lock();
        if !state.order.iter().any(|id| id == agent_id) {
            warn!(agent_id = %agent_id, "Crash reported for unsupervised agent, registering");
            state.order.push(agent_id.to_string());
        }
        let window = self.restart_window;
        let crashes = state.crashes.entry(agent_id.to_string()).or_default();
        while crashes
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) > window)
        {
            crashes.pop_front();
        }
        crashes.push_back(now);
        let count = crashes.len();

        if count <= self.max_restarts as usize {
            info!(
                agent_id = %agent_id,
                reason,
                crashes_in_window = count,
                max_restarts = self.max_restarts,
                "Agent crashed, restarting"
            );
            SupervisorAction::Restart
        } else {
            warn!(
                agent_id = %agent_id,
                reason,
                crashes_in_window = count,
                max_restarts = self.max_restarts,
                "Restart limit exceeded, escalating"
            );
            SupervisorAction::Escalate
        }
    }

    /// Agents that restart alongside `crashed` under this supervisor's strategy.
    pub fn agents_to_restart(&self, crashed: &str) -> Vec<String> {
        restart_targets(self.strategy, &self.state.lock().order, crashed)
    }

    /// Crashes still inside the window as of `now`.
    pub fn crash_count_at(&self, agent_id: &str, now: Instant) -> usize {
        self.state.lock().crashes.get(agent_id).map_or(0, |c| {
            c.iter()
                .filter(|t| now.saturating_duration_since(**t) <= self.restart_window)
                .count()
        })
    }

    pub fn crash_count(&self, agent_id: &str) -> usize {
        self.crash_count_at(agent_id, Instant::now())
    }

    /// Forget an agent's crash history, e.g. after manual intervention.
    pub fn reset(&self, agent_id: &str) {
        if let Some(crashes) = self.state.lock().crashes.get_mut(agent_id) {
            crashes.clear();
        }
    }

    /// Supervised agents in registration order.
    pub fn children(&self) -> Vec<String> {
        self.state.lock().order.clone()
    }
}
