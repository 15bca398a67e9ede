//! # Signoff
//!
//! A persistent, resumable, human-in-the-loop **approval workflow engine**.
//!
//! Signoff models a request as a tree of tasks, each task being a unit of
//! work and a required approval gate. Nothing executes until every task in
//! the tree has been individually approved — approving is a discrete,
//! externally-driven action (a clerk clicking "permit"), not a
//! computation. The engine:
//!
//! - finds, at any moment, the single next task requiring approval
//!   (pre-order, left-to-right, depth-first)
//! - suspends the flow and hands that task back to the caller
//! - resumes and re-checks when an approval comes in, even from a
//!   different process — all state lives in a pluggable record store
//! - executes the whole tree leaf-to-root once approvals are complete,
//!   tracking per-task failures so a fixed flow can be retried
//! - propagates a refusal through the entire tree as a terminal event
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use signoff::{Engine, MemoryRecordStore, Outcome, TaskRegistry};
//!
//! // Register your task types, then build an engine
//! let mut registry = TaskRegistry::new();
//! registry.register_type::<PurchaseRequest>("purchase");
//! let mut engine = Engine::new(registry, MemoryRecordStore::new());
//!
//! // Create and start a flow; it suspends on the first unmet task
//! let mut flow = engine.new_flow("purchase", "laptop for alice", params).await?;
//! if let Outcome::AwaitingApproval(task) = engine.start(&mut flow).await? {
//!     // ...route `task` to its approver; days later, in another process:
//!     engine.approve(&mut flow, task.as_ref()).await?;
//! }
//! ```
//!
//! ## Design Philosophy
//!
//! The name comes from the **sign-off** — the initials at the bottom of a
//! requisition form that let it move to the next desk. The machinery of
//! the workflow is all here, but without a human signing off at each gate,
//! nothing moves. Suspension is not a parked coroutine: an awaiting-
//! approval outcome unwinds the call back to the host, and resumption is a
//! wholly new call carrying the approved task.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![forbid(unsafe_code)]

pub mod engine;
pub mod error;
pub mod event;
pub mod flow;
pub mod outcome;
pub mod record_store;
pub mod registry;
pub mod report;
pub mod task;

pub use engine::Engine;
pub use error::{BoxError, Result, SignoffError};
pub use event::FlowEvent;
pub use flow::{FlowStatus, TaskFlow};
pub use outcome::Outcome;
pub use record_store::{MemoryRecordStore, RecordStore};
#[cfg(feature = "sqlite")]
pub use record_store::SqliteRecordStore;
pub use registry::{TaskConstructor, TaskRegistry};
pub use report::{FlowReport, TaskProgress, TaskReportEntry};
pub use task::{Task, TaskRecord};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_returns_valid_semver() {
        let version = version();
        assert!(!version.is_empty());
        assert!(version.contains('.'));
    }
}
