//! Task records for Granska.
//!
//! A task is the durable record of one analysis request and its outcome.
//! Tasks move through a monotonic status state machine:
//! `Pending -> Processing -> {Completed | Failed}`.

mod store;

pub use store::TaskStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// The kind of analysis a task performs. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    ConversationAnalysis,
    ImageAnalysis,
    DocumentSummarization,
    UrlSummarization,
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "CONVERSATION_ANALYSIS" => Ok(TaskKind::ConversationAnalysis),
            "IMAGE_ANALYSIS" => Ok(TaskKind::ImageAnalysis),
            "DOCUMENT_SUMMARIZATION" => Ok(TaskKind::DocumentSummarization),
            "URL_SUMMARIZATION" => Ok(TaskKind::UrlSummarization),
            _ => Err(format!("Unknown task kind: {}", s)),
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskKind::ConversationAnalysis => "CONVERSATION_ANALYSIS",
            TaskKind::ImageAnalysis => "IMAGE_ANALYSIS",
            TaskKind::DocumentSummarization => "DOCUMENT_SUMMARIZATION",
            TaskKind::UrlSummarization => "URL_SUMMARIZATION",
        };
        write!(f, "{}", s)
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Whether this status is terminal (no further transitions allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TaskStatus::Pending),
            "PROCESSING" => Ok(TaskStatus::Processing),
            "COMPLETED" => Ok(TaskStatus::Completed),
            "FAILED" => Ok(TaskStatus::Failed),
            _ => Err(format!("Unknown task status: {}", s)),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// A durable analysis task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID.
    pub id: Uuid,
    /// Identifier of the principal that submitted the task.
    pub owner_id: String,
    /// Kind of analysis.
    pub kind: TaskKind,
    /// Current status.
    pub status: TaskStatus,
    /// Reference to the original submission (filename, URL, or stored path).
    pub input: String,
    /// Serialized result on Completed; failure description on Failed.
    pub output: Option<String>,
    /// Accumulated metadata (file size, MIME type, word count, ...).
    pub metadata: Map<String, Value>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new task in Processing state with initial metadata.
    pub fn new(owner_id: &str, kind: TaskKind, input: &str, metadata: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            kind,
            status: TaskStatus::Processing,
            input: input.to_string(),
            output: None,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Filter for task listing queries.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Restrict to a single kind.
    pub kind: Option<TaskKind>,
    /// Restrict to a single status.
    pub status: Option<TaskStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_display() {
        for kind in [
            TaskKind::ConversationAnalysis,
            TaskKind::ImageAnalysis,
            TaskKind::DocumentSummarization,
            TaskKind::UrlSummarization,
        ] {
            let parsed: TaskKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }
}
