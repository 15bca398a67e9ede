//! Flow types for the Signoff approval engine.
//!
//! This module defines [`TaskFlow`], the persisted coordinator record for
//! one approval request, and [`FlowStatus`], its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// The lifecycle status of a flow.
///
/// Status only moves forward along the happy path
/// `Processing → Approved → Executed`, or from any non-refused state
/// directly to `Refused`, which is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowStatus {
    /// Approvals are still being collected.
    Processing,

    /// Every task in the tree is approved; execution may proceed.
    Approved,

    /// Every task body ran successfully.
    Executed,

    /// The flow was refused. Terminal.
    Refused,
}

impl FlowStatus {
    /// Returns true if no further state transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowStatus::Executed | FlowStatus::Refused)
    }
}

/// The persisted record for one approval request and its task tree.
///
/// A flow owns only the *descriptor* of its root task — the registered
/// kind plus the original parameters — never a live object; the tree is
/// rebuilt on demand through the registry by calling each task's
/// `dependencies()`. The flow record is created once with status
/// [`FlowStatus::Processing`] and mutated in place on every transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFlow {
    /// Unique identifier of the flow.
    pub id: String,

    /// Free-text annotation describing the request.
    pub annotation: String,

    /// Current lifecycle status.
    pub status: FlowStatus,

    /// Whether the last execution attempt failed.
    pub failed: bool,

    /// Registered kind of the root task.
    pub root_kind: String,

    /// Parameters the root task is reconstructed from.
    pub root_params: JsonValue,

    /// When the flow was created.
    pub created_at: DateTime<Utc>,
}

impl TaskFlow {
    /// Creates a new flow record in `Processing` status.
    pub(crate) fn new(
        root_kind: impl Into<String>,
        annotation: impl Into<String>,
        root_params: JsonValue,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            annotation: annotation.into(),
            status: FlowStatus::Processing,
            failed: false,
            root_kind: root_kind.into(),
            root_params,
            created_at: Utc::now(),
        }
    }

    /// Returns true if the flow has been refused.
    pub fn is_refused(&self) -> bool {
        self.status == FlowStatus::Refused
    }

    /// Marks the flow fully approved.
    pub(crate) fn mark_approved(&mut self) {
        self.status = FlowStatus::Approved;
    }

    /// Marks the flow executed and clears the failure flag.
    pub(crate) fn mark_executed(&mut self) {
        self.status = FlowStatus::Executed;
        self.failed = false;
    }

    /// Marks the flow refused. Irrevocable.
    pub(crate) fn mark_refused(&mut self) {
        self.status = FlowStatus::Refused;
    }

    /// Marks the last execution attempt as failed.
    pub(crate) fn mark_failed(&mut self) {
        self.failed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_flow() -> TaskFlow {
        TaskFlow::new("purchase", "laptop for alice", json!({ "item": "laptop" }))
    }

    #[test]
    fn test_new_flow_defaults() {
        let flow = sample_flow();
        assert_eq!(flow.status, FlowStatus::Processing);
        assert!(!flow.failed);
        assert_eq!(flow.annotation, "laptop for alice");
        assert_eq!(flow.root_kind, "purchase");
        assert_eq!(flow.root_params, json!({ "item": "laptop" }));
        assert!(!flow.id.is_empty());
    }

    #[test]
    fn test_flow_ids_are_unique() {
        assert_ne!(sample_flow().id, sample_flow().id);
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut flow = sample_flow();
        flow.mark_approved();
        assert_eq!(flow.status, FlowStatus::Approved);
        flow.mark_executed();
        assert_eq!(flow.status, FlowStatus::Executed);
        assert!(!flow.failed);
    }

    #[test]
    fn test_mark_executed_clears_failed() {
        let mut flow = sample_flow();
        flow.mark_failed();
        assert!(flow.failed);
        flow.mark_executed();
        assert!(!flow.failed);
    }

    #[test]
    fn test_refusal_is_recorded() {
        let mut flow = sample_flow();
        flow.mark_refused();
        assert!(flow.is_refused());
        assert_eq!(flow.status, FlowStatus::Refused);
    }

    #[test]
    fn test_status_terminality() {
        assert!(!FlowStatus::Processing.is_terminal());
        assert!(!FlowStatus::Approved.is_terminal());
        assert!(FlowStatus::Executed.is_terminal());
        assert!(FlowStatus::Refused.is_terminal());
    }

    #[test]
    fn test_status_serialize() {
        let json = serde_json::to_string(&FlowStatus::Processing).unwrap();
        assert!(json.contains("Processing"));
    }

    #[test]
    fn test_flow_round_trip() {
        let mut flow = sample_flow();
        flow.mark_approved();
        flow.mark_failed();

        let json = serde_json::to_string(&flow).unwrap();
        let restored: TaskFlow = serde_json::from_str(&json).unwrap();
        assert_eq!(flow, restored);
    }
}
