//! Conversion task model: one record per file submitted to a batch.
//!
//! A task is a small finite-state machine:
//!
//! ```text
//! Pending ──▶ Converting ──┬──▶ Completed
//!                          └──▶ Error
//! ```
//!
//! Transitions are checked by [`TaskStatus::can_transition_to`]; the
//! terminal states never change again. Only the batch driver in
//! [`crate::orchestrator`] mutates tasks, so the mutating methods are
//! crate-private and callers only ever see snapshots.

use crate::error::ErrorInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Lifecycle state of a [`ConversionTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Converting,
    Completed,
    Error,
}

impl TaskStatus {
    /// `Completed` and `Error` are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }

    /// Whether `self → next` is a legal step of the task state machine.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Converting)
                | (TaskStatus::Converting, TaskStatus::Completed)
                | (TaskStatus::Converting, TaskStatus::Error)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Converting => "converting",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Reference to a converted file held by the conversion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteArtifact {
    pub converted_file_id: String,
    pub converted_filename: String,
}

impl RemoteArtifact {
    /// The path segment served by the download endpoint:
    /// `{converted_file_id}_{converted_filename}`.
    pub fn download_name(&self) -> String {
        format!("{}_{}", self.converted_file_id, self.converted_filename)
    }
}

/// Rejected state-machine step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task '{task_id}' cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub task_id: String,
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// The tracked record of one file's conversion attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionTask {
    id: String,
    file_name: String,
    from_format: String,
    to_format: String,
    status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    remote_artifact: Option<RemoteArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorInfo>,
}

impl ConversionTask {
    /// A fresh task in `Pending`. `from_format` is fixed here for good.
    pub(crate) fn new(
        id: impl Into<String>,
        file_name: impl Into<String>,
        from_format: impl Into<String>,
        to_format: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            file_name: file_name.into(),
            from_format: from_format.into(),
            to_format: to_format.into(),
            status: TaskStatus::Pending,
            remote_artifact: None,
            error: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn from_format(&self) -> &str {
        &self.from_format
    }

    pub fn to_format(&self) -> &str {
        &self.to_format
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn remote_artifact(&self) -> Option<&RemoteArtifact> {
        self.remote_artifact.as_ref()
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `Pending → Converting`.
    pub(crate) fn start(&mut self) -> Result<(), InvalidTransition> {
        self.advance(TaskStatus::Converting)
    }

    /// `Converting → Completed`, recording where the output lives.
    pub(crate) fn complete(&mut self, artifact: RemoteArtifact) -> Result<(), InvalidTransition> {
        self.advance(TaskStatus::Completed)?;
        self.remote_artifact = Some(artifact);
        Ok(())
    }

    /// `Converting → Error`, recording why.
    pub(crate) fn fail(&mut self, info: ErrorInfo) -> Result<(), InvalidTransition> {
        self.advance(TaskStatus::Error)?;
        self.error = Some(info);
        Ok(())
    }

    fn advance(&mut self, next: TaskStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                task_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// A task id was registered twice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task '{0}' is already registered")]
pub struct DuplicateTask(pub String);

/// Per-status task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub pending: usize,
    pub converting: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Append-only arena of tasks, in submission order.
///
/// Entries are updated in place but never removed or reordered; the id index
/// enforces uniqueness for the lifetime of the registry.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: Vec<ConversionTask>,
    index: HashMap<String, usize>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `task`, returning its slot.
    pub(crate) fn register(&mut self, task: ConversionTask) -> Result<usize, DuplicateTask> {
        if self.index.contains_key(task.id()) {
            return Err(DuplicateTask(task.id().to_string()));
        }
        let slot = self.tasks.len();
        self.index.insert(task.id().to_string(), slot);
        self.tasks.push(task);
        Ok(slot)
    }

    pub(crate) fn slot_mut(&mut self, slot: usize) -> Option<&mut ConversionTask> {
        self.tasks.get_mut(slot)
    }

    pub fn slot(&self, slot: usize) -> Option<&ConversionTask> {
        self.tasks.get(slot)
    }

    pub fn get(&self, id: &str) -> Option<&ConversionTask> {
        self.index.get(id).and_then(|&slot| self.tasks.get(slot))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversionTask> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Owned copy of every task, in submission order.
    pub fn snapshot(&self) -> Vec<ConversionTask> {
        self.tasks.clone()
    }

    pub fn into_tasks(self) -> Vec<ConversionTask> {
        self.tasks
    }

    pub fn summary(&self) -> TaskSummary {
        let mut summary = TaskSummary::default();
        for task in &self.tasks {
            match task.status() {
                TaskStatus::Pending => summary.pending += 1,
                TaskStatus::Converting => summary.converting += 1,
                TaskStatus::Completed => summary.completed += 1,
                TaskStatus::Error => summary.failed += 1,
            }
        }
        summary
    }
}
