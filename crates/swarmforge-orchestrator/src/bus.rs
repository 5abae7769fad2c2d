use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use swarmforge_core::{SwarmError, SwarmMessage, SwarmResult};
use tracing::{debug, warn};
use uuid::Uuid;

/// Callback invoked for every message on a matching topic.
pub type Handler = Arc<dyn Fn(&SwarmMessage) -> SwarmResult<()> + Send + Sync>;

const DEFAULT_MAX_HISTORY: usize = 1000;
const DEFAULT_SLOW_HANDLER: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`
    Single,
    /// `#`
    Trailing,
}

/// A subscription pattern, split into segments once at subscribe time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl TopicPattern {
    /// Parse a pattern such as `task.*` or `agent.#`.
    ///
    /// Rejects empty segments, `#` anywhere but last, and wildcards mixed
    /// into a literal segment (`ta*`).
    pub fn parse(pattern: &str) -> SwarmResult<Self> {
        let parts: Vec<&str> = pattern.split('.').collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let segment = match *part {
                "" => {
                    return Err(SwarmError::InvalidTopic(format!(
                        "'{pattern}' has an empty segment"
                    )))
                }
                "*" => Segment::Single,
                "#" if i + 1 == parts.len() => Segment::Trailing,
                "#" => {
                    return Err(SwarmError::InvalidTopic(format!(
                        "'{pattern}': '#' is only allowed as the last segment"
                    )))
                }
                p if p.contains(['*', '#']) => {
                    return Err(SwarmError::InvalidTopic(format!(
                        "'{pattern}': wildcards must fill a whole segment"
                    )))
                }
                p => Segment::Literal(p.to_string()),
            };
            segments.push(segment);
        }
        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn matches(&self, topic: &str) -> bool {
        let parts: Vec<&str> = topic.split('.').collect();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Trailing => {
                    return parts.len() > i && parts[i..].iter().all(|p| !p.is_empty())
                }
                Segment::Single => {
                    if parts.get(i).map_or(true, |p| p.is_empty()) {
                        return false;
                    }
                }
                Segment::Literal(literal) => {
                    if parts.get(i) != Some(&literal.as_str()) {
                        return false;
                    }
                }
            }
        }
        parts.len() == self.segments.len()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A published message together with the topic it was sent on.
#[derive(Debug, Clone, PartialEq)]
pub struct BusRecord {
    pub topic: String,
    pub message: SwarmMessage,
}

struct Subscription {
    id: Uuid,
    subscriber_id: String,
    pattern: TopicPattern,
    handler: Handler,
}

struct BusState {
    subscriptions: Vec<Subscription>,
    history: VecDeque<BusRecord>,
}

/// Synchronous topic-based message bus with bounded history.
///
/// Handlers run on the publisher's thread, in subscription order, outside
/// the bus lock, so a handler may publish or subscribe without deadlocking.
pub struct MessageBus {
    state: Mutex<BusState>,
    max_history: usize,
    slow_handler_threshold: Duration,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_HISTORY, DEFAULT_SLOW_HANDLER)
    }

    /// Bus keeping at most `max_history` messages and warning about
    /// handlers slower than `slow_handler_threshold`.
    pub fn with_limits(max_history: usize, slow_handler_threshold: Duration) -> Self {
        Self {
            state: Mutex::new(BusState {
                subscriptions: Vec::new(),
                history: VecDeque::with_capacity(max_history.min(DEFAULT_MAX_HISTORY)),
            }),
            max_history,
            slow_handler_threshold,
        }
    }

    /// Register `handler` for every topic matching `pattern`.
    pub fn subscribe<F>(
        &self,
        subscriber_id: impl Into<String>,
        pattern: &str,
        handler: F,
    ) -> SwarmResult<Uuid>
    where
        F: Fn(&SwarmMessage) -> SwarmResult<()> + Send + Sync + 'static,
    {
        let pattern = TopicPattern::parse(pattern)?;
        let subscriber_id = subscriber_id.into();
        let id = Uuid::new_v4();
        debug!(subscriber = %subscriber_id, pattern = %pattern, "Subscribed");
        self.state.lock().subscriptions.push(Subscription {
            id,
            subscriber_id,
            pattern,
            handler: Arc::new(handler),
        });
        Ok(id)
    }

    /// Drop a subscriber's subscriptions, all of them when `pattern` is `None`.
    ///
    /// Returns how many were removed.
    pub fn unsubscribe(&self, subscriber_id: &str, pattern: Option<&str>) -> usize {
        let mut state = self.state.lock();
        let before = state.subscriptions.len();
        state.subscriptions.retain(|s| {
            let same_pattern = pattern.map_or(true, |p| s.pattern.as_str() == p);
            !(s.subscriber_id == subscriber_id && same_pattern)
        });
        let removed = before - state.subscriptions.len();
        debug!(subscriber = %subscriber_id, removed, "Unsubscribed");
        removed
    }

    /// Remove a single subscription by the id `subscribe` returned.
    pub fn unsubscribe_id(&self, subscription_id: Uuid) -> bool {
        let mut state = self.state.lock();
        let before = state.subscriptions.len();
        state.subscriptions.retain(|s| s.id != subscription_id);
        state.subscriptions.len() != before
    }

    /// Deliver `message` to every matching subscriber.
    ///
    /// The message is recorded in history first, even when nobody listens.
    /// Returns the number of handlers that completed without error; a
    /// failing or panicking handler is logged and skipped.
    pub fn publish(&self, topic: &str, message: SwarmMessage) -> usize {
        let targets: Vec<(String, Handler)> = {
            let mut state = self.state.lock();
            if self.max_history > 0 {
                while state.history.len() >= self.max_history {
                    state.history.pop_front();
                }
                state.history.push_back(BusRecord {
                    topic: topic.to_string(),
                    message: message.clone(),
                });
            }
            state
                .subscriptions
                .iter()
                .filter(|s| s.pattern.matches(topic))
                .map(|s| (s.subscriber_id.clone(), Arc::clone(&s.handler)))
                .collect()
        };

        let mut delivered = 0;
        for (subscriber, handler) in targets {
            let started = Instant::now();
            match catch_unwind(AssertUnwindSafe(|| handler(&message))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(topic, subscriber = %subscriber, error = %e, "Handler failed");
                }
                Err(panic) => {
                    warn!(
                        topic,
                        subscriber = %subscriber,
                        panic = panic_message(panic.as_ref()),
                        "Handler panicked"
                    );
                }
            }
            let elapsed = started.elapsed();
            if elapsed > self.slow_handler_threshold {
                warn!(
                    topic,
                    subscriber = %subscriber,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Slow handler"
                );
            }
        }
        debug!(topic, message_id = %message.id(), delivered, "Published");
        delivered
    }

    /// The newest `n` messages, oldest first.
    pub fn recent_messages(&self, n: usize) -> Vec<SwarmMessage> {
        self.recent_records(n)
            .into_iter()
            .map(|r| r.message)
            .collect()
    }

    /// Like [`recent_messages`](Self::recent_messages) but keeps the topic.
    pub fn recent_records(&self, n: usize) -> Vec<BusRecord> {
        let state = self.state.lock();
        let skip = state.history.len().saturating_sub(n);
        state.history.iter().skip(skip).cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
