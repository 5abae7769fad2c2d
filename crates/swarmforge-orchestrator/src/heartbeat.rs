use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Liveness of an agent, derived from the age of its last beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Beat within the timeout.
    Healthy,
    /// Missed the timeout but not yet the dead threshold.
    Stale,
    /// Silent for longer than the dead threshold.
    Dead,
    /// Never registered and never beat.
    Unknown,
}

/// Per-agent liveness bookkeeping.
#[derive(Debug, Clone)]
pub struct HeartbeatRecord {
    pub agent_id: String,
    pub registered_at: Instant,
    /// Registration time until the first beat arrives.
    pub last_seen: Instant,
    pub beat_count: u64,
}

/// Pull-based heartbeat tracker.
///
/// Nothing runs in the background: every status is computed from the
/// elapsed time when `check` is called. The `*_at` variants take the
/// current instant explicitly.
pub struct HeartbeatMonitor {
    records: Mutex<HashMap<String, HeartbeatRecord>>,
    timeout: Duration,
    dead_after: Duration,
}

impl HeartbeatMonitor {
    /// Monitor that marks agents stale after `timeout` and dead after three timeouts.
    pub fn new(timeout: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            timeout,
            dead_after: timeout.saturating_mul(3),
        }
    }

    /// Set the dead threshold. Values below the timeout are raised to it.
    pub fn with_dead_after(mut self, dead_after: Duration) -> Self {
        self.dead_after = dead_after.max(self.timeout);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn dead_after(&self) -> Duration {
        self.dead_after
    }

    pub fn register(&self, agent_id: &str) {
        self.register_at(agent_id, Instant::now());
    }

    /// Start tracking an agent. Re-registering resets its record.
    pub fn register_at(&self, agent_id: &str, now: Instant) {
        debug!(agent_id = %agent_id, "Heartbeat registered");
        self.records.lock().insert(
            agent_id.to_string(),
            HeartbeatRecord {
                agent_id: agent_id.to_string(),
                registered_at: now,
                last_seen: now,
                beat_count: 0,
            },
        );
    }

    pub fn beat(&self, agent_id: &str) {
        self.beat_at(agent_id, Instant::now());
    }

    /// Record a beat, registering the agent if it is new. Last write wins.
    pub fn beat_at(&self, agent_id: &str, now: Instant) {
        let mut records = self.records.lock();
        let record = records
            .entry(agent_id.to_string())
            .or_insert_with(|| HeartbeatRecord {
                agent_id: agent_id.to_string(),
                registered_at: now,
                last_seen: now,
                beat_count: 0,
            });
        record.last_seen = now;
        record.beat_count += 1;
    }

    pub fn unregister(&self, agent_id: &str) -> bool {
        let removed = self.records.lock().remove(agent_id).is_some();
        if removed {
            info!(agent_id = %agent_id, "Heartbeat unregistered");
        }
        removed
    }

    pub fn check(&self, agent_id: &str) -> HealthStatus {
        self.check_at(agent_id, Instant::now())
    }

    pub fn check_at(&self, agent_id: &str, now: Instant) -> HealthStatus {
        match self.records.lock().get(agent_id) {
            Some(record) => self.classify(record, now),
            None => HealthStatus::Unknown,
        }
    }

    /// Status of every tracked agent, computed now.
    pub fn check_all(&self) -> BTreeMap<String, HealthStatus> {
        self.check_all_at(Instant::now())
    }

    pub fn check_all_at(&self, now: Instant) -> BTreeMap<String, HealthStatus> {
        self.records
            .lock()
            .values()
            .map(|r| (r.agent_id.clone(), self.classify(r, now)))
            .collect()
    }

    pub fn record(&self, agent_id: &str) -> Option<HeartbeatRecord> {
        self.records.lock().get(agent_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    fn classify(&self, record: &HeartbeatRecord, now: Instant) -> HealthStatus {
        let age = now.saturating_duration_since(record.last_seen);
        if age <= self.timeout {
            HealthStatus::Healthy
        } else if age <= self.dead_after {
            HealthStatus::Stale
        } else {
            HealthStatus::Dead
        }
    }
}
