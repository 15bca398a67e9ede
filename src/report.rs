//! Flow inspection and reporting.
//!
//! This module provides [`FlowReport`] for inspecting the current state of
//! a flow's task tree, built by [`Engine::report`](crate::Engine::report).

use std::fmt;

use chrono::{DateTime, Utc};

use crate::{FlowStatus, TaskFlow, TaskRecord};

/// How far a single task has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskProgress {
    /// The resolver has not reached this task yet; no record exists.
    Undiscovered,

    /// Discovered and waiting for someone to approve it.
    AwaitingApproval,

    /// Approved; its body has not run yet.
    Approved,

    /// Its body ran successfully.
    Executed,

    /// Its last body run failed.
    Failed,
}

impl TaskProgress {
    /// Returns true if the task has been approved.
    pub fn is_approved(&self) -> bool {
        matches!(
            self,
            TaskProgress::Approved | TaskProgress::Executed | TaskProgress::Failed
        )
    }
}

/// Report entry for a single task within a flow.
#[derive(Debug, Clone)]
pub struct TaskReportEntry {
    /// The task's tag.
    pub tag: String,
    /// The task's registered kind.
    pub kind: String,
    /// Depth in the dependency tree (root is 0).
    pub depth: usize,
    /// How far the task has progressed.
    pub progress: TaskProgress,
    /// When the task was approved.
    pub approved_at: Option<DateTime<Utc>>,
    /// When the task's body last succeeded.
    pub executed_at: Option<DateTime<Utc>>,
}

impl TaskReportEntry {
    /// Creates an entry for a task the resolver has not discovered yet.
    pub fn undiscovered(tag: impl Into<String>, kind: impl Into<String>, depth: usize) -> Self {
        Self {
            tag: tag.into(),
            kind: kind.into(),
            depth,
            progress: TaskProgress::Undiscovered,
            approved_at: None,
            executed_at: None,
        }
    }

    /// Creates an entry from a stored task record.
    pub fn from_record(record: &TaskRecord, depth: usize) -> Self {
        let progress = if record.failed {
            TaskProgress::Failed
        } else if record.executed_at.is_some() {
            TaskProgress::Executed
        } else if record.approved {
            TaskProgress::Approved
        } else {
            TaskProgress::AwaitingApproval
        };
        Self {
            tag: record.tag.clone(),
            kind: record.kind.clone(),
            depth,
            progress,
            approved_at: record.approved_at,
            executed_at: record.executed_at,
        }
    }

    /// Returns a progress indicator character.
    pub fn progress_char(&self) -> char {
        match self.progress {
            TaskProgress::Undiscovered => '⏳',
            TaskProgress::AwaitingApproval => '👀',
            TaskProgress::Approved => '🔄',
            TaskProgress::Executed => '✅',
            TaskProgress::Failed => '❌',
        }
    }
}

/// A read-only snapshot of a flow and its task tree.
///
/// Entries are listed in pre-order (the resolver's visiting order), each
/// annotated with its depth so hosts can render the tree shape.
#[derive(Debug, Clone)]
pub struct FlowReport {
    /// The flow at snapshot time.
    pub flow: TaskFlow,
    /// One entry per task, pre-order.
    pub tasks: Vec<TaskReportEntry>,
}

impl FlowReport {
    /// Creates a new report.
    pub fn new(flow: TaskFlow, tasks: Vec<TaskReportEntry>) -> Self {
        Self { flow, tasks }
    }

    /// Returns true if every task in the tree has been approved.
    pub fn is_fully_approved(&self) -> bool {
        self.tasks.iter().all(|t| t.progress.is_approved())
    }

    /// Returns the tags of discovered tasks still awaiting approval.
    pub fn awaiting_tags(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|t| matches!(t.progress, TaskProgress::AwaitingApproval))
            .map(|t| t.tag.as_str())
            .collect()
    }

    /// Returns the tags of tasks whose last run failed.
    pub fn failed_tags(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|t| matches!(t.progress, TaskProgress::Failed))
            .map(|t| t.tag.as_str())
            .collect()
    }

    /// Returns the approval progress as a percentage.
    pub fn progress_percent(&self) -> f32 {
        if self.tasks.is_empty() {
            return 100.0;
        }

        let approved = self
            .tasks
            .iter()
            .filter(|t| t.progress.is_approved())
            .count();

        (approved as f32 / self.tasks.len() as f32) * 100.0
    }
}

impl fmt::Display for FlowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Flow \"{}\" ({}):",
            self.flow.annotation, self.flow.id
        )?;
        writeln!(f)?;

        for task in &self.tasks {
            let indent = "  ".repeat(task.depth);
            let progress_str = format!("{:?}", task.progress);
            let time_str = task
                .executed_at
                .or(task.approved_at)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string());

            writeln!(
                f,
                "  {} {}{:<20} {:<18} {}",
                task.progress_char(),
                indent,
                task.tag,
                progress_str,
                time_str
            )?;
        }

        writeln!(f)?;
        writeln!(f, "Approvals: {:.0}%", self.progress_percent())?;

        match self.flow.status {
            FlowStatus::Refused => writeln!(f, "Status: Refused")?,
            FlowStatus::Executed => writeln!(f, "Status: Executed")?,
            FlowStatus::Approved if self.flow.failed => writeln!(
                f,
                "Status: Execution failed ({} task(s))",
                self.failed_tags().len()
            )?,
            FlowStatus::Approved => writeln!(f, "Status: Approved, executing")?,
            FlowStatus::Processing => writeln!(
                f,
                "Status: Awaiting approval ({} task(s))",
                self.awaiting_tags().len()
            )?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    #[derive(Debug)]
    struct Gate(&'static str);

    #[async_trait]
    impl crate::Task for Gate {
        fn kind(&self) -> &str {
            "gate"
        }

        fn tag(&self) -> String {
            self.0.to_string()
        }
    }

    fn record(name: &'static str) -> TaskRecord {
        TaskRecord::new("flow-1", &Gate(name))
    }

    fn sample_flow() -> TaskFlow {
        TaskFlow::new("gate", "quarterly purchase", json!(null))
    }

    #[test]
    fn test_entry_undiscovered() {
        let entry = TaskReportEntry::undiscovered("a", "gate", 2);
        assert_eq!(entry.progress, TaskProgress::Undiscovered);
        assert_eq!(entry.depth, 2);
        assert_eq!(entry.progress_char(), '⏳');
    }

    #[test]
    fn test_entry_from_fresh_record() {
        let entry = TaskReportEntry::from_record(&record("a"), 0);
        assert_eq!(entry.progress, TaskProgress::AwaitingApproval);
        assert_eq!(entry.progress_char(), '👀');
    }

    #[test]
    fn test_entry_from_approved_record() {
        let mut rec = record("a");
        rec.mark_approved();
        let entry = TaskReportEntry::from_record(&rec, 0);
        assert_eq!(entry.progress, TaskProgress::Approved);
        assert!(entry.approved_at.is_some());
    }

    #[test]
    fn test_entry_from_executed_record() {
        let mut rec = record("a");
        rec.mark_approved();
        rec.mark_executed();
        let entry = TaskReportEntry::from_record(&rec, 0);
        assert_eq!(entry.progress, TaskProgress::Executed);
    }

    #[test]
    fn test_entry_from_failed_record() {
        let mut rec = record("a");
        rec.mark_approved();
        rec.mark_failed();
        let entry = TaskReportEntry::from_record(&rec, 0);
        assert_eq!(entry.progress, TaskProgress::Failed);
        assert_eq!(entry.progress_char(), '❌');
    }

    #[test]
    fn test_progress_is_approved() {
        assert!(!TaskProgress::Undiscovered.is_approved());
        assert!(!TaskProgress::AwaitingApproval.is_approved());
        assert!(TaskProgress::Approved.is_approved());
        assert!(TaskProgress::Executed.is_approved());
        assert!(TaskProgress::Failed.is_approved());
    }

    #[test]
    fn test_empty_report() {
        let report = FlowReport::new(sample_flow(), vec![]);
        assert!(report.is_fully_approved());
        assert_eq!(report.progress_percent(), 100.0);
    }

    #[test]
    fn test_partial_approval_progress() {
        let mut approved = record("a");
        approved.mark_approved();

        let report = FlowReport::new(
            sample_flow(),
            vec![
                TaskReportEntry::from_record(&approved, 0),
                TaskReportEntry::from_record(&record("b"), 1),
                TaskReportEntry::undiscovered("c", "gate", 1),
                TaskReportEntry::undiscovered("d", "gate", 2),
            ],
        );

        assert!(!report.is_fully_approved());
        assert_eq!(report.progress_percent(), 25.0);
        assert_eq!(report.awaiting_tags(), vec!["b"]);
    }

    #[test]
    fn test_failed_tags() {
        let mut failed = record("a");
        failed.mark_approved();
        failed.mark_failed();

        let report = FlowReport::new(
            sample_flow(),
            vec![TaskReportEntry::from_record(&failed, 0)],
        );
        assert_eq!(report.failed_tags(), vec!["a"]);
        assert!(report.is_fully_approved());
    }

    #[test]
    fn test_display_processing_flow() {
        let report = FlowReport::new(
            sample_flow(),
            vec![
                TaskReportEntry::from_record(&record("root"), 0),
                TaskReportEntry::undiscovered("child", "gate", 1),
            ],
        );

        let display = format!("{}", report);
        assert!(display.contains("quarterly purchase"));
        assert!(display.contains("root"));
        assert!(display.contains("child"));
        assert!(display.contains("Awaiting approval (1 task(s))"));
    }

    #[test]
    fn test_display_executed_flow() {
        let mut flow = sample_flow();
        flow.mark_approved();
        flow.mark_executed();

        let mut rec = record("root");
        rec.mark_approved();
        rec.mark_executed();

        let report = FlowReport::new(flow, vec![TaskReportEntry::from_record(&rec, 0)]);
        let display = format!("{}", report);
        assert!(display.contains("Status: Executed"));
        assert!(display.contains("Approvals: 100%"));
    }

    #[test]
    fn test_display_failed_flow() {
        let mut flow = sample_flow();
        flow.mark_approved();
        flow.mark_failed();

        let mut rec = record("root");
        rec.mark_approved();
        rec.mark_failed();

        let report = FlowReport::new(flow, vec![TaskReportEntry::from_record(&rec, 0)]);
        let display = format!("{}", report);
        assert!(display.contains("Execution failed (1 task(s))"));
    }

    #[test]
    fn test_display_refused_flow() {
        let mut flow = sample_flow();
        flow.mark_refused();

        let report = FlowReport::new(flow, vec![TaskReportEntry::from_record(&record("root"), 0)]);
        let display = format!("{}", report);
        assert!(display.contains("Status: Refused"));
    }
}
