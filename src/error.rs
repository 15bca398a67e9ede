//! Error types for the Signoff approval engine.
//!
//! This module defines the error taxonomy used throughout the crate,
//! following the non-exhaustive enum pattern to allow future error variants
//! without breaking compatibility.

use thiserror::Error;

/// Boxed error type returned by task bodies.
///
/// Task implementations keep their own error types; the engine wraps a
/// failing body in [`SignoffError::Execution`] with the original error
/// preserved as the source.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The main error type for Signoff operations.
///
/// This enum uses `#[non_exhaustive]` to allow adding new error variants
/// in the future without breaking backward compatibility.
///
/// Workflow-level outcomes (executed, awaiting approval, refused, failed)
/// are normally reported through [`Outcome`](crate::Outcome); the
/// `FlowRefused` and `AwaitingApproval` variants here exist for hosts that
/// prefer error-style control flow via
/// [`Outcome::into_result`](crate::Outcome::into_result).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SignoffError {
    /// The flow has been refused; refusal is terminal.
    #[error("Flow has been refused")]
    FlowRefused,

    /// Direct execution was requested while approvals are still being
    /// collected.
    #[error("Flow is still collecting approvals")]
    FlowProcessing,

    /// The suspension signal: the named task must be approved before the
    /// flow can make progress. Not a failure.
    #[error("Task {0} is awaiting approval")]
    AwaitingApproval(String),

    /// `approve` was called for a task whose record is already approved.
    #[error("Task {tag} is already approved")]
    AlreadyApproved {
        /// Tag of the task.
        tag: String,
    },

    /// `approve` was called for a task the resolver has never discovered,
    /// so no record exists for it.
    #[error("Task {tag} has not been submitted for approval")]
    Unsubmitted {
        /// Tag of the task.
        tag: String,
    },

    /// A task-type name has no registered constructor.
    #[error("Unknown task kind: {0}")]
    UnknownTaskKind(String),

    /// A task's dependency tree loops back on itself.
    #[error("Dependency cycle through task {tag}")]
    DependencyCycle {
        /// Tag of the task that closed the cycle.
        tag: String,
    },

    /// A task body failed during execution. The task's and the flow's
    /// `failed` flags are persisted before this is raised.
    #[error("Task {tag} failed: {source}")]
    Execution {
        /// Tag of the failing task.
        tag: String,
        /// The original error from the task body.
        #[source]
        source: BoxError,
    },

    /// Error occurred in the record store layer.
    #[error("Record store error: {0}")]
    Store(String),

    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error from file or database operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error (for the SQLite record store).
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(String),
}

/// A specialized `Result` type for Signoff operations.
///
/// This is a type alias for `std::result::Result<T, SignoffError>` to
/// reduce boilerplate in function signatures throughout the crate.
pub type Result<T> = std::result::Result<T, SignoffError>;
