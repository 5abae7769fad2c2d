use crate::heartbeat::HealthStatus;
use crate::process::{ProcessOrchestrator, ProcessState, RecoveryReport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Crash reason recorded for agents found dead by the watchdog.
pub const HEARTBEAT_TIMEOUT: &str = "heartbeat timeout";

/// Shortest sweep interval `start` accepts.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Turns silent agents into crash reports.
///
/// Nothing in the orchestrator polls on its own; a caller that wants
/// automatic detection starts a watchdog next to its runtime.
pub struct Watchdog;

impl Watchdog {
    /// Run one pass: report every running agent whose heartbeat is dead.
    ///
    /// Each agent is checked again right before its report, since an
    /// earlier report in the same pass may already have respawned it as a
    /// sibling.
    pub fn sweep(orchestrator: &ProcessOrchestrator) -> Vec<RecoveryReport> {
        let dead = orchestrator.check_liveness();
        if dead.is_empty() {
            return Vec::new();
        }
        debug!(count = dead.len(), "Watchdog found dead agents");
        dead.iter()
            .filter(|id| {
                let running = orchestrator
                    .agent(id)
                    .is_some_and(|r| r.state == ProcessState::Running);
                running && orchestrator.heartbeat().check(id) == HealthStatus::Dead
            })
            .filter_map(|id| match orchestrator.report_crash(id, HEARTBEAT_TIMEOUT) {
                Ok(report) => Some(report),
                Err(e) => {
                    // The agent may have been shut down between the check and the report.
                    warn!(agent_id = %id, error = %e, "Watchdog could not report crash");
                    None
                }
            })
            .collect()
    }

    /// Spawn a tokio task that sweeps every `interval`.
    ///
    /// Intervals below [`MIN_INTERVAL`] are raised to it. Returns the
    /// [`tokio::task::JoinHandle`] so the caller can abort it. Must be
    /// called from within a tokio runtime.
    pub fn start(
        orchestrator: Arc<ProcessOrchestrator>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let interval = interval.max(MIN_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                for report in Self::sweep(&orchestrator) {
                    debug!(
                        agent_id = %report.agent_id,
                        action = ?report.action,
                        restarted = report.restarted.len(),
                        "Watchdog recovery"
                    );
                }
            }
        })
    }
}
