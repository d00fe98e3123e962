//! Run outcome and per-attempt history

use super::task::{InputContext, TaskResult};
use crate::error::CrewError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Finished, but the feedback loop hit its cap or a validation report was unreadable
    CompletedWithWarnings,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithWarnings => "completed_with_warnings",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::CompletedWithWarnings)
    }
}

/// One task attempt, successful or not
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub agent_id: String,
    /// 1-based attempt number for this task within the run
    pub attempt: u32,
    /// Feedback cycle the attempt belongs to (1 for the first pass)
    pub cycle: u32,
    pub input_context: InputContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Final aggregated result of a run. Always produced, even on failure.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// Result of the last task that completed
    pub final_result: Option<TaskResult>,
    pub warnings: Vec<String>,
    /// Last validation report, when a validation task ran
    pub validation_report: Option<TaskResult>,
    pub error: Option<CrewError>,
    pub history: Vec<TaskRecord>,
}

impl RunOutcome {
    /// Successful results in execution order
    pub fn results(&self) -> impl Iterator<Item = &TaskResult> {
        self.history.iter().filter_map(|r| r.result.as_ref())
    }

    /// Number of attempts recorded for `task_id`
    pub fn attempts(&self, task_id: &str) -> usize {
        self.history.iter().filter(|r| r.task_id == task_id).count()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }
}
