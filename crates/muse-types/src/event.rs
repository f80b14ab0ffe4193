// Coordinator Events
// Append-only event stream published while a session runs

use crate::planner::TodoItem;
use crate::workflow::{StageRole, StageSnapshot};
use serde::{Deserialize, Serialize};

/// Events emitted by the session and task-planner coordinators.
///
/// Each trace step produces at most one `StageThought` and, for planner chat
/// steps, one `PlanMessage` — never more, regardless of how often the same
/// trace prefix is re-delivered by the poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinatorEvent {
    SessionSubmitted {
        request_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    StageThought {
        request_id: String,
        role: StageRole,
        label: String,
        content: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    PlanMessage {
        request_id: String,
        content: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// Final chat-style result of a completed session
    AssistantMessage {
        request_id: String,
        content: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    ProgressUpdated {
        request_id: String,
        stages: Vec<StageSnapshot>,
        loop_count: u32,
        progress_percent: Option<u8>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    PatchProposed {
        request_id: String,
        proposal_id: String,
        file_path: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    PatchApplied {
        proposal_id: String,
        file_path: String,
        auto: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// Reconciliation needs an operator: carries a unified diff for display
    PatchPendingReview {
        proposal_id: String,
        file_path: String,
        diff_preview: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    PatchRejected {
        proposal_id: String,
        file_path: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    TodoListUpdated {
        request_id: String,
        items: Vec<TodoItem>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    SessionCompleted {
        request_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    SessionFailed {
        request_id: String,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    SessionPaused {
        request_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    SessionResumed {
        request_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    SessionCancelled {
        request_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}
