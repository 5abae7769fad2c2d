use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of traffic a [`SwarmMessage`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// A task handed to an agent.
    TaskAssignment,
    /// The outcome of a task.
    TaskResult,
    /// A request for agents to review an artifact or decision.
    ReviewRequest,
    /// A reviewer's verdict.
    ReviewResponse,
    /// A lifecycle or progress notification.
    StatusUpdate,
    /// A liveness signal.
    Heartbeat,
    /// A failure report.
    Error,
    /// A message addressed to every agent.
    Broadcast,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::TaskAssignment => write!(f, "task_assignment"),
            MessageType::TaskResult => write!(f, "task_result"),
            MessageType::ReviewRequest => write!(f, "review_request"),
            MessageType::ReviewResponse => write!(f, "review_response"),
            MessageType::StatusUpdate => write!(f, "status_update"),
            MessageType::Heartbeat => write!(f, "heartbeat"),
            MessageType::Error => write!(f, "error"),
            MessageType::Broadcast => write!(f, "broadcast"),
        }
    }
}

/// A single message exchanged between agents over the bus.
///
/// Messages are immutable once built: fields are only reachable through
/// accessors, and the builder methods consume `self`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmMessage {
    id: Uuid,
    message_type: MessageType,
    sender: String,
    recipient: Option<String>,
    payload: serde_json::Value,
    timestamp: DateTime<Utc>,
}

impl SwarmMessage {
    /// Creates a new message with a fresh id and the current timestamp.
    pub fn new(
        message_type: MessageType,
        sender: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_type,
            sender: sender.into(),
            recipient: None,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Creates a [`MessageType::StatusUpdate`] message.
    pub fn status(sender: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::new(MessageType::StatusUpdate, sender, payload)
    }

    /// Addresses the message to a single agent.
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    /// Unique identifier for this message.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// What kind of message this is.
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// The agent (or component) that produced the message.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// The addressee, if the message is not a broadcast.
    pub fn recipient(&self) -> Option<&str> {
        self.recipient.as_deref()
    }

    /// The message body.
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// UTC timestamp of when the message was created.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = SwarmMessage::new(
            MessageType::TaskResult,
            "coder-1",
            serde_json::json!({"ok": true}),
        );
        assert_eq!(msg.message_type(), MessageType::TaskResult);
        assert_eq!(msg.sender(), "coder-1");
        assert!(msg.recipient().is_none());
        assert_eq!(msg.payload()["ok"], true);
    }

    #[test]
    fn test_addressed_message() {
        let msg = SwarmMessage::status("orchestrator", serde_json::Value::Null).to("tester-1");
        assert_eq!(msg.recipient(), Some("tester-1"));
        assert_eq!(msg.message_type(), MessageType::StatusUpdate);
    }

    #[test]
    fn test_message_type_wire_names() {
        let json = serde_json::to_string(&MessageType::ReviewRequest).unwrap();
        assert_eq!(json, "\"review_request\"");
        assert_eq!(MessageType::TaskAssignment.to_string(), "task_assignment");
    }
}
