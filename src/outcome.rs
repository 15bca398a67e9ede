//! Coordinator call outcomes.
//!
//! This module defines [`Outcome`], the tagged result returned by the
//! engine's `start`/`approve`/`retry`/`execute` operations. The tagged
//! value is the primary contract; [`Outcome::into_result`] adapts it for
//! hosts that prefer error-style control flow.

use crate::{SignoffError, Task};

/// The outcome of a coordinator call.
///
/// `Err(..)` from an engine operation is reserved for caller errors
/// (unsubmitted or already-approved tasks, unknown kinds, cycles) and
/// storage failures; everything the workflow itself can conclude is
/// reported here.
#[derive(Debug)]
pub enum Outcome {
    /// All approvals were satisfied and every task body ran; the flow
    /// reached `Executed`.
    Executed,

    /// The workflow suspended: the carried task must be approved before
    /// any further progress. Resubmit it through
    /// [`Engine::approve`](crate::Engine::approve) once the decision is
    /// made.
    AwaitingApproval(Box<dyn Task>),

    /// The flow has been refused; no operation will ever succeed again.
    Refused,

    /// Every task was approved, but a body failed during execution. The
    /// flow stays `Approved` with its `failed` flag set and can be retried
    /// once the underlying condition is fixed.
    Failed(SignoffError),
}

impl Outcome {
    /// Returns true if the flow reached `Executed`.
    pub fn is_executed(&self) -> bool {
        matches!(self, Outcome::Executed)
    }

    /// Returns the task awaiting approval, if the workflow suspended.
    pub fn awaiting(&self) -> Option<&dyn Task> {
        match self {
            Outcome::AwaitingApproval(task) => Some(task.as_ref()),
            _ => None,
        }
    }

    /// Converts the outcome into an error-style result.
    ///
    /// Hosts that would rather catch signals than match on the tagged
    /// value get [`SignoffError::AwaitingApproval`] for a suspension,
    /// [`SignoffError::FlowRefused`] for a refusal, and the original error
    /// for an execution failure.
    pub fn into_result(self) -> crate::Result<()> {
        match self {
            Outcome::Executed => Ok(()),
            Outcome::AwaitingApproval(task) => Err(SignoffError::AwaitingApproval(task.tag())),
            Outcome::Refused => Err(SignoffError::FlowRefused),
            Outcome::Failed(err) => Err(err),
        }
    }
}
