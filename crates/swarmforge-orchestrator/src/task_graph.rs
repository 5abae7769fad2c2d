use crate::types::{SubTask, TaskStatus};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap, HashSet};
use swarmforge_core::{SwarmError, SwarmResult};
use uuid::Uuid;

/// Topologically sort a batch of sub-tasks (Kahn's algorithm).
///
/// Among tasks that are ready at the same time, input order wins, so a
/// chain produced by the decomposer comes back unchanged. Fails with
/// [`SwarmError::MissingDependency`] when an edge points outside the batch
/// and with [`SwarmError::CyclicDependency`] when some tasks can never run.
pub fn execution_order(subtasks: &[SubTask]) -> SwarmResult<Vec<Uuid>> {
    let index: HashMap<Uuid, usize> = subtasks
        .iter()
        .enumerate()
        .map(|(i, task)| (task.id, i))
        .collect();

    let mut in_degree = vec![0usize; subtasks.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); subtasks.len()];
    for (i, task) in subtasks.iter().enumerate() {
        for dep in &task.depends_on {
            let &d = index.get(dep).ok_or(SwarmError::MissingDependency {
                task_id: task.id,
                dependency: *dep,
            })?;
            in_degree[i] += 1;
            dependents[d].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, deg)| **deg == 0)
        .map(|(i, _)| i)
        .collect();

    let mut order = Vec::with_capacity(subtasks.len());
    while let Some(i) = ready.pop_first() {
        order.push(subtasks[i].id);
        for &next in &dependents[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() < subtasks.len() {
        let tasks = subtasks
            .iter()
            .zip(&in_degree)
            .filter(|(_, deg)| **deg > 0)
            .map(|(task, _)| task.id)
            .collect();
        return Err(SwarmError::CyclicDependency { tasks });
    }
    Ok(order)
}

/// Tasks that no other task in the batch depends on.
pub fn leaf_tasks(subtasks: &[SubTask]) -> Vec<&SubTask> {
    let depended_on: HashSet<Uuid> = subtasks
        .iter()
        .flat_map(|t| t.depends_on.iter().copied())
        .collect();
    subtasks
        .iter()
        .filter(|t| !depended_on.contains(&t.id))
        .collect()
}

/// An owned batch of sub-tasks with dependency tracking.
///
/// Tasks keep their insertion order; `ready_tasks` lists pending tasks
/// whose dependencies have all completed.
pub struct TaskGraph {
    tasks: Vec<SubTask>,
    index: HashMap<Uuid, usize>,
    completed: HashSet<Uuid>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            index: HashMap::new(),
            completed: HashSet::new(),
        }
    }

    /// Build a graph from a batch, e.g. the output of `decompose`.
    pub fn from_tasks(tasks: Vec<SubTask>) -> Self {
        let mut graph = Self::new();
        for task in tasks {
            graph.add(task);
        }
        graph
    }

    /// Add a task. A task with an id already present replaces the old one.
    pub fn add(&mut self, task: SubTask) -> Uuid {
        let id = task.id;
        if task.status == TaskStatus::Completed {
            self.completed.insert(id);
        } else {
            self.completed.remove(&id);
        }
        match self.index.get(&id) {
            Some(&i) => self.tasks[i] = task,
            None => {
                self.index.insert(id, self.tasks.len());
                self.tasks.push(task);
            }
        }
        id
    }

    pub fn get(&self, id: Uuid) -> Option<&SubTask> {
        self.index.get(&id).map(|&i| &self.tasks[i])
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut SubTask> {
        self.index.get(&id).map(|&i| &mut self.tasks[i])
    }

    /// All tasks in insertion order.
    pub fn tasks(&self) -> &[SubTask] {
        &self.tasks
    }

    pub fn into_tasks(self) -> Vec<SubTask> {
        self.tasks
    }

    /// Pending tasks whose dependencies are all completed, in insertion order.
    pub fn ready_tasks(&self) -> Vec<&SubTask> {
        self.tasks
            .iter()
            .filter(|t| t.is_ready(&self.completed))
            .collect()
    }

    /// Record that the pool handed a task to `agent_id`.
    pub fn mark_assigned(&mut self, id: Uuid, agent_id: impl Into<String>) -> bool {
        match self.get_mut(id) {
            Some(task) => {
                task.status = TaskStatus::Assigned;
                task.assigned_agent = Some(agent_id.into());
                self.completed.remove(&id);
                true
            }
            None => false,
        }
    }

    pub fn mark_running(&mut self, id: Uuid) -> bool {
        match self.get_mut(id) {
            Some(task) => {
                task.status = TaskStatus::Running;
                self.completed.remove(&id);
                true
            }
            None => false,
        }
    }

    pub fn mark_completed(&mut self, id: Uuid) -> bool {
        match self.get_mut(id) {
            Some(task) => {
                task.status = TaskStatus::Completed;
                task.completed_at = Some(Utc::now());
                self.completed.insert(id);
                true
            }
            None => false,
        }
    }

    pub fn mark_failed(&mut self, id: Uuid, reason: impl Into<String>) -> bool {
        match self.get_mut(id) {
            Some(task) => {
                task.status = TaskStatus::Failed {
                    reason: reason.into(),
                };
                task.completed_at = None;
                self.completed.remove(&id);
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .count()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn total_count(&self) -> usize {
        self.tasks.len()
    }

    /// Every task has completed or failed.
    pub fn is_done(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_terminal())
    }

    pub fn has_cycle(&self) -> bool {
        matches!(
            self.execution_order(),
            Err(SwarmError::CyclicDependency { .. })
        )
    }

    pub fn execution_order(&self) -> SwarmResult<Vec<Uuid>> {
        execution_order(&self.tasks)
    }

    pub fn leaf_tasks(&self) -> Vec<&SubTask> {
        leaf_tasks(&self.tasks)
    }
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}
