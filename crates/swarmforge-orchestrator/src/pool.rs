use crate::task_graph::TaskGraph;
use crate::types::{AgentRole, SubTask, SwarmAgent, TaskStatus};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use swarmforge_core::{AssignmentFailure, SwarmError, SwarmResult};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Aggregate view of the pool at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStatus {
    pub total_agents: usize,
    pub available_agents: usize,
    pub active_tasks: u32,
    pub total_capacity: u32,
    pub by_role: BTreeMap<AgentRole, usize>,
    pub average_load: f64,
}

/// Registry of worker agents that hands out sub-tasks by role, capability and load.
///
/// Agents are kept in registration order, which is also the tie-breaker
/// between agents with equal load.
pub struct AgentPool {
    agents: Mutex<Vec<SwarmAgent>>,
}

impl AgentPool {
    pub fn new() -> Self {
        Self {
            agents: Mutex::new(Vec::new()),
        }
    }

    /// Build a pool from a roster, registering agents in order.
    pub fn with_agents(agents: impl IntoIterator<Item = SwarmAgent>) -> Self {
        let pool = Self::new();
        for agent in agents {
            pool.register(agent);
        }
        pool
    }

    /// Register an agent. Re-registering an id replaces the record in place.
    ///
    /// The pool owns `active_tasks`: a new agent starts idle and a
    /// replacement keeps the live count, capped at its new `max_concurrent`.
    pub fn register(&self, mut agent: SwarmAgent) {
        let mut agents = self.agents.lock();
        info!(agent_id = %agent.agent_id, role = %agent.role, "Registering agent");
        match agents.iter_mut().find(|a| a.agent_id == agent.agent_id) {
            Some(existing) => {
                agent.active_tasks = existing.active_tasks.min(agent.max_concurrent);
                *existing = agent;
            }
            None => {
                agent.active_tasks = 0;
                agents.push(agent);
            }
        }
    }

    /// Remove an agent. Returns `false` if it was not registered.
    pub fn unregister(&self, agent_id: &str) -> bool {
        let mut agents = self.agents.lock();
        let before = agents.len();
        agents.retain(|a| a.agent_id != agent_id);
        let removed = agents.len() != before;
        if removed {
            info!(agent_id = %agent_id, "Unregistered agent");
        }
        removed
    }

    /// Hand `task` to the least loaded eligible agent.
    ///
    /// On success the agent's `active_tasks` is incremented and the task is
    /// marked assigned, both under the pool lock. On failure neither the
    /// pool nor the task is touched.
    pub fn assign(&self, task: &mut SubTask) -> SwarmResult<SwarmAgent> {
        let mut agents = self.agents.lock();
        let index = select(&agents, task).map_err(|reason| {
            warn!(task_id = %task.id, role = %task.required_role, %reason, "Assignment failed");
            SwarmError::Assignment {
                task_id: task.id,
                reason,
            }
        })?;

        let agent = &mut agents[index];
        agent.active_tasks += 1;
        task.status = TaskStatus::Assigned;
        task.assigned_agent = Some(agent.agent_id.clone());
        debug!(
            task_id = %task.id,
            agent_id = %agent.agent_id,
            active_tasks = agent.active_tasks,
            "Task assigned"
        );
        Ok(agent.clone())
    }

    /// The agent `assign` would pick right now, without changing anything.
    pub fn peek(&self, task: &SubTask) -> SwarmResult<SwarmAgent> {
        let agents = self.agents.lock();
        select(&agents, task)
            .map(|i| agents[i].clone())
            .map_err(|reason| SwarmError::Assignment {
                task_id: task.id,
                reason,
            })
    }

    /// Assign every ready task of a graph, in execution order.
    ///
    /// The graph is validated first, so a cyclic batch never reaches the
    /// pool. Stops at the first assignment failure; tasks assigned before
    /// it stay assigned.
    pub fn assign_ready(&self, graph: &mut TaskGraph) -> SwarmResult<Vec<(Uuid, String)>> {
        let order = graph.execution_order()?;
        let ready: Vec<Uuid> = {
            let ready = graph.ready_tasks();
            order
                .into_iter()
                .filter(|id| ready.iter().any(|t| t.id == *id))
                .collect()
        };

        let mut assigned = Vec::with_capacity(ready.len());
        for id in ready {
            if let Some(task) = graph.get_mut(id) {
                let agent = self.assign(task)?;
                assigned.push((id, agent.agent_id));
            }
        }
        Ok(assigned)
    }

    /// Give one task slot back. Releasing an idle agent is a no-op.
    ///
    /// Returns `true` if a slot was actually freed.
    pub fn release(&self, agent_id: &str) -> bool {
        let mut agents = self.agents.lock();
        match agents.iter_mut().find(|a| a.agent_id == agent_id) {
            Some(agent) if agent.active_tasks > 0 => {
                agent.active_tasks -= 1;
                debug!(agent_id = %agent_id, active_tasks = agent.active_tasks, "Released task slot");
                true
            }
            _ => false,
        }
    }

    /// Give back every slot an agent holds, e.g. after its instance died.
    ///
    /// Returns how many slots were freed.
    pub fn release_all(&self, agent_id: &str) -> u32 {
        let mut agents = self.agents.lock();
        match agents.iter_mut().find(|a| a.agent_id == agent_id) {
            Some(agent) => {
                let freed = std::mem::take(&mut agent.active_tasks);
                if freed > 0 {
                    debug!(agent_id = %agent_id, freed, "Released all task slots");
                }
                freed
            }
            None => 0,
        }
    }

    pub fn get(&self, agent_id: &str) -> Option<SwarmAgent> {
        self.agents
            .lock()
            .iter()
            .find(|a| a.agent_id == agent_id)
            .cloned()
    }

    /// Snapshot of all agents in registration order.
    pub fn agents(&self) -> Vec<SwarmAgent> {
        self.agents.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.agents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.lock().is_empty()
    }

    pub fn status(&self) -> PoolStatus {
        let agents = self.agents.lock();
        let mut by_role = BTreeMap::new();
        for agent in agents.iter() {
            *by_role.entry(agent.role).or_insert(0) += 1;
        }
        let average_load = if agents.is_empty() {
            0.0
        } else {
            agents.iter().map(SwarmAgent::load).sum::<f64>() / agents.len() as f64
        };
        PoolStatus {
            total_agents: agents.len(),
            available_agents: agents.iter().filter(|a| a.available()).count(),
            active_tasks: agents.iter().map(|a| a.active_tasks).sum(),
            total_capacity: agents.iter().map(|a| a.max_concurrent).sum(),
            by_role,
            average_load,
        }
    }
}

impl Default for AgentPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Index of the least loaded eligible and available agent; the earliest
/// registered wins ties.
fn select(agents: &[SwarmAgent], task: &SubTask) -> Result<usize, AssignmentFailure> {
    let mut any_eligible = false;
    let mut best: Option<usize> = None;
    for (i, agent) in agents.iter().enumerate() {
        if !agent.is_eligible(task) {
            continue;
        }
        any_eligible = true;
        if !agent.available() {
            continue;
        }
        match best {
            Some(b) if agents[b].load() <= agent.load() => {}
            _ => best = Some(i),
        }
    }
    match best {
        Some(i) => Ok(i),
        None if any_eligible => Err(AssignmentFailure::AtCapacity),
        None => Err(AssignmentFailure::NoEligibleAgent),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::decomposer::decompose;

    fn coder(id: &str, max: u32) -> SwarmAgent {
        SwarmAgent::new(id, AgentRole::Coder)
            .with_capabilities(["code", "rust"])
            .with_max_concurrent(max)
    }

    #[test]
    fn test_assign_picks_lowest_load() {
        let pool = AgentPool::with_agents([coder("c1", 2), coder("c2", 4)]);

        let mut t1 = SubTask::new("one", AgentRole::Coder);
        assert_eq!(pool.assign(&mut t1).unwrap().agent_id, "c1");
        // c1 is now at 0.5, c2 at 0.0.
        let mut t2 = SubTask::new("two", AgentRole::Coder);
        assert_eq!(pool.assign(&mut t2).unwrap().agent_id, "c2");
        // c1 0.5, c2 0.25.
        let mut t3 = SubTask::new("three", AgentRole::Coder);
        assert_eq!(pool.assign(&mut t3).unwrap().agent_id, "c2");
    }

    #[test]
    fn test_equal_load_ties_go_to_registration_order() {
        let pool = AgentPool::with_agents([coder("first", 1), coder("second", 1)]);
        let mut task = SubTask::new("tie", AgentRole::Coder);
        assert_eq!(pool.assign(&mut task).unwrap().agent_id, "first");
    }

    #[test]
    fn test_assign_marks_task() {
        let pool = AgentPool::with_agents([coder("c1", 1)]);
        let mut task = SubTask::new("x", AgentRole::Coder);
        let agent = pool.assign(&mut task).unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);
        assert_eq!(task.assigned_agent.as_deref(), Some("c1"));
        assert_eq!(agent.active_tasks(), 1);
        assert_eq!(pool.get("c1").unwrap().active_tasks(), 1);
    }

    #[test]
    fn test_capability_subset_required() {
        let pool = AgentPool::with_agents([coder("c1", 1)]);
        let mut task = SubTask::new("go work", AgentRole::Coder).with_capabilities(["go"]);
        let err = pool.assign(&mut task).unwrap_err();
        assert!(matches!(
            err,
            SwarmError::Assignment {
                reason: AssignmentFailure::NoEligibleAgent,
                ..
            }
        ));
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.assigned_agent.is_none());
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let pool = AgentPool::with_agents([coder("c1", 2)]);
        for _ in 0..2 {
            let mut task = SubTask::new("x", AgentRole::Coder);
            pool.assign(&mut task).unwrap();
        }
        let mut extra = SubTask::new("overflow", AgentRole::Coder);
        let err = pool.assign(&mut extra).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(extra.status, TaskStatus::Pending);
        let agent = pool.get("c1").unwrap();
        assert_eq!(agent.active_tasks(), agent.max_concurrent);
    }

    #[test]
    fn test_release_is_floored_and_idempotent() {
        let pool = AgentPool::with_agents([coder("c1", 1)]);
        let mut task = SubTask::new("x", AgentRole::Coder);
        pool.assign(&mut task).unwrap();

        assert!(pool.release("c1"));
        assert!(!pool.release("c1"));
        assert!(!pool.release("missing"));
        assert_eq!(pool.get("c1").unwrap().active_tasks(), 0);

        let mut again = SubTask::new("y", AgentRole::Coder);
        assert!(pool.assign(&mut again).is_ok());
    }

    #[test]
    fn test_release_all_frees_every_slot() {
        let pool = AgentPool::with_agents([coder("c1", 3)]);
        pool.assign(&mut SubTask::new("a", AgentRole::Coder)).unwrap();
        pool.assign(&mut SubTask::new("b", AgentRole::Coder)).unwrap();

        assert_eq!(pool.release_all("c1"), 2);
        assert_eq!(pool.get("c1").unwrap().active_tasks(), 0);
        assert_eq!(pool.release_all("c1"), 0);
        assert_eq!(pool.release_all("ghost"), 0);
    }

    #[test]
    fn test_register_replaces_and_unregister() {
        let pool = AgentPool::with_agents([coder("c1", 1), coder("c2", 1)]);
        pool.register(coder("c1", 5));
        let ids: Vec<String> = pool.agents().into_iter().map(|a| a.agent_id).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert_eq!(pool.get("c1").unwrap().max_concurrent, 5);

        assert!(pool.unregister("c1"));
        assert!(!pool.unregister("c1"));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_deserialized_agent_starts_idle() {
        let agent: SwarmAgent = serde_json::from_str(
            r#"{"agent_id":"c1","role":"coder","max_concurrent":1,"active_tasks":5}"#,
        )
        .unwrap();
        assert_eq!(agent.active_tasks(), 0);

        let mut busy = coder("c2", 1);
        busy.active_tasks = 7;
        let pool = AgentPool::with_agents([agent, busy]);
        assert_eq!(pool.get("c1").unwrap().active_tasks(), 0);
        assert_eq!(pool.get("c2").unwrap().active_tasks(), 0);
    }

    #[test]
    fn test_reregister_keeps_live_count_within_capacity() {
        let pool = AgentPool::with_agents([coder("c1", 3)]);
        for _ in 0..3 {
            pool.assign(&mut SubTask::new("x", AgentRole::Coder)).unwrap();
        }

        pool.register(coder("c1", 4));
        assert_eq!(pool.get("c1").unwrap().active_tasks(), 3);

        pool.register(coder("c1", 2));
        let agent = pool.get("c1").unwrap();
        assert_eq!(agent.active_tasks(), 2);
        assert!(agent.active_tasks() <= agent.max_concurrent);
    }

    #[test]
    fn test_peek_does_not_mutate() {
        let pool = AgentPool::with_agents([coder("c1", 1)]);
        let task = SubTask::new("x", AgentRole::Coder);
        assert_eq!(pool.peek(&task).unwrap().agent_id, "c1");
        assert_eq!(pool.get("c1").unwrap().active_tasks(), 0);
    }

    #[test]
    fn test_status_breakdown() {
        let pool = AgentPool::with_agents([
            coder("c1", 2),
            coder("c2", 2),
            SwarmAgent::new("r1", AgentRole::Reviewer).with_max_concurrent(1),
        ]);
        let mut task = SubTask::new("x", AgentRole::Reviewer);
        pool.assign(&mut task).unwrap();

        let status = pool.status();
        assert_eq!(status.total_agents, 3);
        assert_eq!(status.available_agents, 2);
        assert_eq!(status.active_tasks, 1);
        assert_eq!(status.total_capacity, 5);
        assert_eq!(status.by_role.get(&AgentRole::Coder), Some(&2));
        assert_eq!(status.by_role.get(&AgentRole::Reviewer), Some(&1));
        assert!((status.average_load - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_pool_status() {
        let status = AgentPool::new().status();
        assert_eq!(status.total_agents, 0);
        assert_eq!(status.average_load, 0.0);
    }

    #[test]
    fn test_assign_ready_only_touches_first_phase() {
        let pool = AgentPool::with_agents(crate::profiles::default_roster());
        let mut graph = TaskGraph::from_tasks(decompose("design and implement the cache"));
        let assigned = pool.assign_ready(&mut graph).unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].1, "architect-1");
        assert_eq!(graph.pending_count(), 1);
    }

    #[test]
    fn test_assign_ready_rejects_cycles() {
        let pool = AgentPool::with_agents([coder("c1", 4)]);
        let mut a = SubTask::new("a", AgentRole::Coder);
        let b = SubTask::new("b", AgentRole::Coder).with_dependencies(vec![a.id]);
        a.depends_on = vec![b.id];
        let mut graph = TaskGraph::from_tasks(vec![a, b]);
        assert!(matches!(
            pool.assign_ready(&mut graph),
            Err(SwarmError::CyclicDependency { .. })
        ));
        assert_eq!(pool.get("c1").unwrap().active_tasks(), 0);
    }
}
