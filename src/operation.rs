//! Pending operation data structure.
//!
//! An [`Operation`] is the durable, replayable mutation command that flows
//! through the resilience layer. It is created synchronously at the moment of
//! user action and persisted before the enqueue call returns, so a process
//! crash can never silently lose a pending mutation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of mutation kinds this layer replays.
///
/// One variant per create/update/delete of each mutable entity type the
/// application manages (scheduling entries and task reminders).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreateEvent,
    UpdateEvent,
    DeleteEvent,
    CreateReminder,
    UpdateReminder,
    DeleteReminder,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateEvent => write!(f, "create_event"),
            Self::UpdateEvent => write!(f, "update_event"),
            Self::DeleteEvent => write!(f, "delete_event"),
            Self::CreateReminder => write!(f, "create_reminder"),
            Self::UpdateReminder => write!(f, "update_reminder"),
            Self::DeleteReminder => write!(f, "delete_reminder"),
        }
    }
}

/// A durable, replayable mutation command awaiting acknowledgment by the
/// remote service.
///
/// # Example
///
/// ```
/// use offline_resilience::{Operation, OperationKind};
/// use serde_json::json;
///
/// let op = Operation::new(
///     OperationKind::CreateEvent,
///     json!({"title": "Dentist", "starts_at": "2026-09-01T09:00:00Z"}),
/// );
///
/// assert_eq!(op.retry_count, 0);
/// assert!(op.last_error.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// Unique id (UUID v4), stable across process restarts
    pub id: String,
    /// Which remote mutation this replays
    pub kind: OperationKind,
    /// Opaque serialized command arguments (always a JSON object)
    pub payload: Value,
    /// Creation timestamp (epoch millis)
    pub created_at: i64,
    /// Number of failed replay attempts so far
    pub retry_count: u32,
    /// Description of the most recent failure, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Operation {
    /// Create a new operation with a fresh id and zero retries.
    pub fn new(kind: OperationKind, payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            payload,
            created_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as i64,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Whether this operation has used up its retry budget.
    ///
    /// Exhausted operations stay in the queue (never silently dropped) but
    /// are excluded from automatic drains until the caller resets them.
    #[must_use]
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        self.retry_count >= max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_operation() {
        let op = Operation::new(OperationKind::CreateEvent, json!({"title": "Standup"}));

        assert_eq!(op.kind, OperationKind::CreateEvent);
        assert_eq!(op.retry_count, 0);
        assert!(op.last_error.is_none());
        assert!(op.created_at > 0);
        assert!(!op.id.is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Operation::new(OperationKind::DeleteReminder, json!({}));
        let b = Operation::new(OperationKind::DeleteReminder, json!({}));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_exhaustion_threshold() {
        let mut op = Operation::new(OperationKind::UpdateEvent, json!({"id": "evt-1"}));
        assert!(!op.is_exhausted(3));

        op.retry_count = 2;
        assert!(!op.is_exhausted(3));

        op.retry_count = 3;
        assert!(op.is_exhausted(3));
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut op = Operation::new(
            OperationKind::CreateReminder,
            json!({"title": "Pay rent", "due": "2026-09-01"}),
        );
        op.retry_count = 2;
        op.last_error = Some("request timed out".to_string());

        let json_str = serde_json::to_string(&op).unwrap();
        let back: Operation = serde_json::from_str(&json_str).unwrap();

        assert_eq!(back.id, op.id);
        assert_eq!(back.kind, op.kind);
        assert_eq!(back.payload, op.payload);
        assert_eq!(back.retry_count, 2);
        assert_eq!(back.last_error.as_deref(), Some("request timed out"));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let op = Operation::new(OperationKind::DeleteEvent, json!({"id": "evt-9"}));
        let json_str = serde_json::to_string(&op).unwrap();
        assert!(json_str.contains("\"delete_event\""));
    }

    #[test]
    fn test_serialize_skips_none_last_error() {
        let op = Operation::new(OperationKind::CreateEvent, json!({}));
        let json_str = serde_json::to_string(&op).unwrap();
        assert!(!json_str.contains("last_error"));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(OperationKind::CreateEvent.to_string(), "create_event");
        assert_eq!(OperationKind::UpdateReminder.to_string(), "update_reminder");
    }
}
