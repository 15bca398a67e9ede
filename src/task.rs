//! Task node types for the Signoff approval engine.
//!
//! This module defines the [`Task`] trait implemented by every node in an
//! approval tree, and [`TaskRecord`], the persisted state kept for each
//! task once the resolver has discovered it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt::Debug;
use uuid::Uuid;

use crate::error::BoxError;

/// A trait representing one node in an approval tree.
///
/// Every task is both a unit of work (its [`run`](Task::run) body) and an
/// approval gate: the engine will not execute any body until every task in
/// the tree has been individually approved. Task instances are transient —
/// they are reconstructed from persisted parameters each time the tree is
/// walked, so implementations must not rely on in-memory identity. Durable
/// state lives in the task's [`TaskRecord`].
///
/// # Determinism
///
/// [`tag`](Task::tag) and [`dependencies`](Task::dependencies) must be
/// deterministic functions of the task's parameters: the same parameters
/// must always produce the same tag and the same ordered dependency list.
/// The engine recomputes the tree shape on every traversal and relies on
/// this stability to resume a suspended flow at the right node. This is a
/// documented requirement, not something the engine can enforce.
///
/// # Object Safety
///
/// This trait is object-safe; the engine works with `Box<dyn Task>` trees
/// rebuilt through the [`TaskRegistry`](crate::TaskRegistry).
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use serde::{Deserialize, Serialize};
/// use serde_json::json;
/// use signoff::Task;
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct BudgetCheck {
///     department: String,
/// }
///
/// #[async_trait]
/// impl Task for BudgetCheck {
///     fn kind(&self) -> &str {
///         "budget-check"
///     }
///
///     fn tag(&self) -> String {
///         format!("budget:{}", self.department)
///     }
///
///     fn params(&self) -> serde_json::Value {
///         json!({ "department": self.department })
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Debug + Send + Sync {
    /// Returns the registered type name of this task.
    ///
    /// The kind is persisted with the task's record so the record alone is
    /// enough to reconstruct a live task through the registry.
    fn kind(&self) -> &str;

    /// Returns the task's tag, a deterministic function of its parameters.
    ///
    /// The tag must be unique within the owning flow; it is the task's
    /// identity across traversals and the key of its persisted record.
    fn tag(&self) -> String;

    /// Returns the parameters persisted into the task's record.
    ///
    /// These are opaque to the engine and handed back to the registered
    /// constructor when the task is rehydrated. Defaults to `Null` for
    /// parameterless task types.
    fn params(&self) -> JsonValue {
        JsonValue::Null
    }

    /// Produces the ordered list of tasks this task depends on.
    ///
    /// Order is significant: the resolver surfaces unmet tasks in declared
    /// order, so it must be stable across calls. Defaults to no
    /// dependencies (a leaf).
    fn dependencies(&self) -> Vec<Box<dyn Task>> {
        Vec::new()
    }

    /// The work body, invoked once every task in the tree is approved.
    ///
    /// Bodies run leaf-to-root. Returning an error marks this task and the
    /// owning flow as failed and aborts the remaining execution chain; a
    /// later retry will re-run this body. Defaults to a no-op for tasks
    /// that are pure approval gates.
    async fn run(&self) -> std::result::Result<(), BoxError> {
        Ok(())
    }

    /// Hook invoked after this task has been approved.
    async fn on_approved(&self) {}

    /// Hook invoked on every task in the tree when the flow is refused.
    ///
    /// `caused_by_me` is true only for the task the refusal was issued
    /// against.
    async fn on_refused(&self, _caused_by_me: bool) {}

    /// Hook invoked on the last-operated task when the flow suspends.
    ///
    /// `awaiting` is the task whose approval is outstanding; a typical
    /// override notifies whoever is responsible for approving it.
    async fn on_delayed(&self, _awaiting: &dyn Task) {}

    /// Hook invoked after this task's body has run successfully.
    async fn after_run(&self) {}
}

/// The persisted state of one discovered task.
///
/// A record is first inserted the moment the resolver discovers the task
/// unmet (not at tree-construction time) and is mutated in place by
/// approval and execution; records are never deleted by the engine. The
/// record is keyed by `(flow_id, tag)` and additionally carries a
/// store-wide unique `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Store-wide unique identifier.
    pub id: String,

    /// Identifier of the owning flow.
    pub flow_id: String,

    /// The task's tag, unique within the flow.
    pub tag: String,

    /// The task's registered type name.
    pub kind: String,

    /// Whether the task has been approved.
    pub approved: bool,

    /// Whether the last run of the task's body failed.
    pub failed: bool,

    /// The task's parameters, opaque to the engine.
    pub params: JsonValue,

    /// When the record was first persisted.
    pub created_at: DateTime<Utc>,

    /// When the task was approved.
    pub approved_at: Option<DateTime<Utc>>,

    /// When the task's body last ran successfully.
    pub executed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Creates a fresh, unapproved record for a task.
    pub fn new(flow_id: impl Into<String>, task: &dyn Task) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            flow_id: flow_id.into(),
            tag: task.tag(),
            kind: task.kind().to_string(),
            approved: false,
            failed: false,
            params: task.params(),
            created_at: Utc::now(),
            approved_at: None,
            executed_at: None,
        }
    }

    /// Marks the record approved, stamping the approval time.
    pub fn mark_approved(&mut self) {
        self.approved = true;
        self.approved_at = Some(Utc::now());
    }

    /// Marks the record's body as having run successfully.
    pub fn mark_executed(&mut self) {
        self.failed = false;
        self.executed_at = Some(Utc::now());
    }

    /// Marks the record's body as failed.
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    /// Returns true if the task's body still needs to run.
    ///
    /// A body runs when it has never succeeded, or when its last run
    /// failed; already-succeeded tasks are skipped on re-execution.
    pub fn needs_run(&self) -> bool {
        self.failed || self.executed_at.is_none()
    }
}
