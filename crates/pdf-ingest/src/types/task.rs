//! Task records and their state transitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Task status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Completed or failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether `self -> next` is a legal edge of the task lifecycle.
    ///
    /// `Processing -> Pending` only happens during startup recovery.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match (self, next) {
            (TaskStatus::Pending, TaskStatus::Processing) => true,
            (TaskStatus::Processing, TaskStatus::Completed) => true,
            (TaskStatus::Processing, TaskStatus::Failed) => true,
            (TaskStatus::Processing, TaskStatus::Pending) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of a successful extraction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    /// Extracted text
    pub text: String,
    /// Number of pages (at least 1)
    pub page_count: u32,
    /// Size of the source file in bytes
    pub file_size: u64,
    /// Document metadata (PDF info dictionary and analysis hints)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Wall time spent extracting
    #[serde(default)]
    pub duration_ms: u64,
}

/// One unit of queued PDF processing work
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub filename: String,
    pub path: PathBuf,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    /// Records written before ordering existed come back as `UNORDERED`
    /// and are renumbered when the store opens.
    #[serde(default = "unordered")]
    pub display_order: i64,
}

fn unordered() -> i64 {
    Task::UNORDERED
}

impl Task {
    /// Placeholder order for legacy records
    pub const UNORDERED: i64 = i64::MAX;

    /// Create a new pending task
    pub fn new(filename: impl Into<String>, path: impl Into<PathBuf>, display_order: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            path: path.into(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            result: None,
            display_order,
        }
    }

    /// Sort key used for every listing: display order, then creation time
    pub fn sort_key(&self) -> (i64, DateTime<Utc>) {
        (self.display_order, self.created_at)
    }

    /// Merge a patch into this task, enforcing the lifecycle invariants
    pub fn apply(&mut self, patch: TaskPatch) -> Result<()> {
        if let Some(next) = patch.status {
            if !self.status.can_transition_to(next) {
                return Err(Error::invalid_state(format!(
                    "task {} cannot move from {} to {}",
                    self.id, self.status, next
                )));
            }

            let at = patch.at.unwrap_or_else(Utc::now);
            match next {
                TaskStatus::Pending => {
                    self.started_at = None;
                }
                TaskStatus::Processing => {
                    self.started_at = Some(at.max(self.created_at));
                }
                TaskStatus::Completed => {
                    let result = patch.result.ok_or_else(|| {
                        Error::invalid_argument("completing a task requires a result")
                    })?;
                    self.result = Some(result);
                    self.error = None;
                    self.completed_at = Some(self.clamp_completion(at));
                }
                TaskStatus::Failed => {
                    let error = patch.error.ok_or_else(|| {
                        Error::invalid_argument("failing a task requires an error message")
                    })?;
                    self.error = Some(error);
                    self.result = None;
                    self.completed_at = Some(self.clamp_completion(at));
                }
            }
            self.status = next;
        }

        if let Some(order) = patch.display_order {
            self.display_order = order;
        }

        Ok(())
    }

    fn clamp_completion(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        at.max(self.started_at.unwrap_or(self.created_at))
    }
}

/// Partial update to a task record.
///
/// Built through the constructors so that a status change always carries
/// the fields that status requires.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    status: Option<TaskStatus>,
    at: Option<DateTime<Utc>>,
    error: Option<String>,
    result: Option<TaskResult>,
    display_order: Option<i64>,
}

impl TaskPatch {
    /// pending -> processing
    pub fn start() -> Self {
        Self {
            status: Some(TaskStatus::Processing),
            at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// processing -> completed
    pub fn complete(result: TaskResult) -> Self {
        Self {
            status: Some(TaskStatus::Completed),
            at: Some(Utc::now()),
            result: Some(result),
            ..Default::default()
        }
    }

    /// processing -> failed
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            status: Some(TaskStatus::Failed),
            at: Some(Utc::now()),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// processing -> pending, used by restart recovery
    pub fn requeue() -> Self {
        Self {
            status: Some(TaskStatus::Pending),
            ..Default::default()
        }
    }

    /// Change only the display order
    pub fn display_order(order: i64) -> Self {
        Self {
            display_order: Some(order),
            ..Default::default()
        }
    }
}

/// Process-wide queue settings, persisted alongside the tasks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueSettings {
    pub concurrency: usize,
    #[serde(default)]
    pub paused: bool,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            concurrency: 1,
            paused: false,
        }
    }
}
