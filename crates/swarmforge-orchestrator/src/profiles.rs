use crate::types::{AgentRole, SwarmAgent};

/// Create the default roster: one agent per pipeline role.
///
/// Capabilities line up with what the decomposer asks for, so a fresh
/// roster can take every phase of a decomposed task.
pub fn default_roster() -> Vec<SwarmAgent> {
    vec![
        coordinator_profile(),
        architect_profile(),
        coder_profile(),
        tester_profile(),
        reviewer_profile(),
    ]
}

/// Default capability set for a role.
pub fn capabilities_for(role: AgentRole) -> &'static [&'static str] {
    match role {
        AgentRole::Coordinator => &["planning", "delegation"],
        AgentRole::Architect => &["design", "planning"],
        AgentRole::Coder => &["code", "refactor"],
        AgentRole::Tester => &["testing", "code"],
        AgentRole::Reviewer => &["review", "security"],
        AgentRole::Researcher => &["research"],
    }
}

fn coordinator_profile() -> SwarmAgent {
    SwarmAgent::new("coordinator-1", AgentRole::Coordinator)
        .with_capabilities(capabilities_for(AgentRole::Coordinator).iter().copied())
        .with_max_concurrent(4)
}

fn architect_profile() -> SwarmAgent {
    SwarmAgent::new("architect-1", AgentRole::Architect)
        .with_capabilities(capabilities_for(AgentRole::Architect).iter().copied())
        .with_max_concurrent(1)
}

// Coders get the most headroom; implementation is the longest phase.
fn coder_profile() -> SwarmAgent {
    SwarmAgent::new("coder-1", AgentRole::Coder)
        .with_capabilities(capabilities_for(AgentRole::Coder).iter().copied())
        .with_max_concurrent(3)
}

fn tester_profile() -> SwarmAgent {
    SwarmAgent::new("tester-1", AgentRole::Tester)
        .with_capabilities(capabilities_for(AgentRole::Tester).iter().copied())
        .with_max_concurrent(2)
}

fn reviewer_profile() -> SwarmAgent {
    SwarmAgent::new("reviewer-1", AgentRole::Reviewer)
        .with_capabilities(capabilities_for(AgentRole::Reviewer).iter().copied())
        .with_max_concurrent(2)
}
