//! Multi-step task records for bulk email operations

use super::GmailId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_max_results() -> usize {
    100
}

/// One concrete email operation, with the parameters it requires.
///
/// This is a closed set: every step a task can carry is one of these
/// variants, and execution matches exhaustively, so an unknown action is a
/// deserialization error rather than a silent no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "params", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailAction {
    /// Move messages to trash, or delete permanently
    Delete {
        message_ids: Vec<GmailId>,
        #[serde(default)]
        permanent: bool,
    },
    /// Remove messages from the inbox
    Archive { message_ids: Vec<GmailId> },
    /// Apply or remove a named label
    Label {
        message_ids: Vec<GmailId>,
        label_name: String,
        #[serde(default)]
        remove: bool,
    },
    /// Clear the UNREAD label
    MarkRead { message_ids: Vec<GmailId> },
    /// Set the UNREAD label
    MarkUnread { message_ids: Vec<GmailId> },
    /// Set the STARRED label
    Star { message_ids: Vec<GmailId> },
    /// Clear the STARRED label
    Unstar { message_ids: Vec<GmailId> },
    /// Find message IDs matching a provider search query
    Search {
        query: String,
        #[serde(default = "default_max_results")]
        max_results: usize,
    },
}

impl EmailAction {
    /// Short action name for logging and step results
    pub fn name(&self) -> &'static str {
        match self {
            EmailAction::Delete { .. } => "DELETE",
            EmailAction::Archive { .. } => "ARCHIVE",
            EmailAction::Label { .. } => "LABEL",
            EmailAction::MarkRead { .. } => "MARK_READ",
            EmailAction::MarkUnread { .. } => "MARK_UNREAD",
            EmailAction::Star { .. } => "STAR",
            EmailAction::Unstar { .. } => "UNSTAR",
            EmailAction::Search { .. } => "SEARCH",
        }
    }
}

/// Lifecycle status of a task
///
/// Transitions only move forward: a completed or failed task is never
/// resurrected. Cancellation is applied externally to pending tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Whether the task has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }
}

/// Broad task category, used for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    EmailCleanup,
    EmailOrganization,
    EmailSearch,
    Custom,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::EmailCleanup => "email_cleanup",
            TaskKind::EmailOrganization => "email_organization",
            TaskKind::EmailSearch => "email_search",
            TaskKind::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email_cleanup" => Some(TaskKind::EmailCleanup),
            "email_organization" => Some(TaskKind::EmailOrganization),
            "email_search" => Some(TaskKind::EmailSearch),
            "custom" => Some(TaskKind::Custom),
            _ => None,
        }
    }
}

/// One step of a task, mutated in place as it executes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStep {
    #[serde(flatten)]
    pub action: EmailAction,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl TaskStep {
    pub fn new(action: EmailAction) -> Self {
        Self {
            action,
            completed: false,
            result: None,
            error: None,
        }
    }
}

/// A multi-step asynchronous operation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique integer identifier (database primary key, 0 until stored)
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    pub kind: TaskKind,
    pub description: String,
    pub status: TaskStatus,
    /// Ordered steps; executed front to back
    pub steps: Vec<TaskStep>,
    /// 1 (highest) to 5 (lowest)
    pub priority: u8,
    /// 0-100
    pub progress: u8,
    /// Collected step results once completed
    pub result: Option<Value>,
    /// Error message if the task failed
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending task (id assigned by the database)
    pub fn new(
        user_id: i64,
        kind: TaskKind,
        description: impl Into<String>,
        steps: Vec<TaskStep>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            user_id,
            kind,
            description: description.into(),
            status: TaskStatus::Pending,
            steps,
            priority: 1,
            progress: 0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 5);
        self
    }
}
