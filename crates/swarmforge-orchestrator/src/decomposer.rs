use crate::types::{AgentRole, SubTask};
use std::collections::HashSet;

struct Phase {
    name: &'static str,
    keywords: &'static [&'static str],
    role: AgentRole,
    capability: &'static str,
}

/// Pipeline phases in the order they always run.
const PHASES: [Phase; 4] = [
    Phase {
        name: "Design",
        keywords: &["design", "architect", "plan"],
        role: AgentRole::Architect,
        capability: "design",
    },
    Phase {
        name: "Implement",
        keywords: &["implement", "build", "code"],
        role: AgentRole::Coder,
        capability: "code",
    },
    Phase {
        name: "Test",
        keywords: &["test", "tests", "testing", "verify"],
        role: AgentRole::Tester,
        capability: "testing",
    },
    Phase {
        name: "Review",
        keywords: &["review", "audit"],
        role: AgentRole::Reviewer,
        capability: "review",
    },
];

/// Split a free-text task into a chain of phase sub-tasks.
///
/// Each recognised phase becomes one sub-task that depends on the one
/// before it, so the result is always a simple chain. Phases are emitted
/// in pipeline order no matter where their keyword appears in the text.
/// Text with no recognised keyword becomes a single coder task.
pub fn decompose(description: &str) -> Vec<SubTask> {
    let description = description.trim();
    let words: HashSet<String> = description
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    let mut subtasks: Vec<SubTask> = Vec::new();
    for phase in PHASES
        .iter()
        .filter(|p| p.keywords.iter().any(|k| words.contains(*k)))
    {
        let mut task = SubTask::new(format!("{}: {description}", phase.name), phase.role)
            .with_capabilities([phase.capability]);
        if let Some(prev) = subtasks.last() {
            task.depends_on.push(prev.id);
        }
        subtasks.push(task);
    }

    if subtasks.is_empty() {
        tracing::debug!("No phase keywords found, emitting a single coder task");
        subtasks.push(SubTask::new(description, AgentRole::Coder));
    }

    tracing::debug!(phases = subtasks.len(), "Decomposed task description");
    subtasks
}
