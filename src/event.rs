//! Flow lifecycle events.
//!
//! This module provides [`FlowEvent`] for observing engine activity.
//! Events are broadcast through a channel that can be subscribed to for
//! monitoring, logging, or building approval inboxes.

/// An event emitted while the engine drives a flow.
///
/// Events use `String` identifiers to keep the event type simple and easy
/// to serialize for logging or transmission.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum FlowEvent {
    /// A flow was started (its root task approved).
    FlowStarted {
        /// The flow's identifier.
        flow_id: String,
    },

    /// The resolver discovered an unmet task and persisted its first
    /// record.
    TaskDiscovered {
        /// The flow's identifier.
        flow_id: String,
        /// The discovered task's tag.
        tag: String,
    },

    /// The workflow suspended, waiting for the named task to be approved.
    AwaitingApproval {
        /// The flow's identifier.
        flow_id: String,
        /// Tag of the task awaiting approval.
        tag: String,
    },

    /// A task was approved.
    TaskApproved {
        /// The flow's identifier.
        flow_id: String,
        /// The approved task's tag.
        tag: String,
    },

    /// Every task in the tree is approved; execution is about to begin.
    FlowApproved {
        /// The flow's identifier.
        flow_id: String,
    },

    /// A task's body ran successfully.
    TaskExecuted {
        /// The flow's identifier.
        flow_id: String,
        /// The executed task's tag.
        tag: String,
    },

    /// A task's body failed.
    TaskFailed {
        /// The flow's identifier.
        flow_id: String,
        /// The failing task's tag.
        tag: String,
        /// Error message describing the failure.
        error: String,
    },

    /// Every task body ran; the flow reached `Executed`.
    FlowExecuted {
        /// The flow's identifier.
        flow_id: String,
    },

    /// The flow was refused.
    FlowRefused {
        /// The flow's identifier.
        flow_id: String,
        /// Tag of the task the refusal was issued against.
        cause_tag: String,
    },
}

impl FlowEvent {
    /// Returns the flow ID for this event.
    pub fn flow_id(&self) -> &str {
        match self {
            Self::FlowStarted { flow_id }
            | Self::TaskDiscovered { flow_id, .. }
            | Self::AwaitingApproval { flow_id, .. }
            | Self::TaskApproved { flow_id, .. }
            | Self::FlowApproved { flow_id }
            | Self::TaskExecuted { flow_id, .. }
            | Self::TaskFailed { flow_id, .. }
            | Self::FlowExecuted { flow_id }
            | Self::FlowRefused { flow_id, .. } => flow_id,
        }
    }

    /// Returns the task tag for this event, if applicable.
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::TaskDiscovered { tag, .. }
            | Self::AwaitingApproval { tag, .. }
            | Self::TaskApproved { tag, .. }
            | Self::TaskExecuted { tag, .. }
            | Self::TaskFailed { tag, .. } => Some(tag),
            Self::FlowRefused { cause_tag, .. } => Some(cause_tag),
            Self::FlowStarted { .. } | Self::FlowApproved { .. } | Self::FlowExecuted { .. } => {
                None
            }
        }
    }

    /// Returns true if this is an error event.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::TaskFailed { .. })
    }

    /// Returns true if this event ends the flow's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FlowExecuted { .. } | Self::FlowRefused { .. })
    }
}
