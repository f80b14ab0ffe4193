// Workflow Types
// Core type definitions for agent session coordination

use serde::{Deserialize, Serialize};

// ============================================================================
// Session State
// ============================================================================

/// Status of a workflow session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// No workflow submitted yet
    Idle,
    /// Pipeline is executing, poller active
    Running,
    /// Paused by the user (task-planner only)
    Paused,
    /// Pipeline finished with a final action
    Completed,
    /// Pipeline or transport failed
    Error,
}

impl WorkflowStatus {
    /// Terminal statuses stop the poller and release the request id
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Error)
    }
}

/// Snapshot of session state for UI consumption
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub request_id: Option<String>,
    pub status: WorkflowStatus,
    pub cursor: usize,
    pub stages: Vec<StageSnapshot>,
    pub loop_count: u32,
    /// Bound the loop counter is compared against for display
    pub max_loops: Option<u32>,
    pub progress_percent: Option<u8>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error_message: Option<String>,
}

/// Per-stage display status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub role: StageRole,
    pub status: StageStatus,
}

// ============================================================================
// Pipeline Stages
// ============================================================================

/// Pipeline role that produced a trace step. The stage set is fixed and
/// ordered; `ALL` is the display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRole {
    Planner,
    Writer,
    Editor,
    Reviewer,
}

impl StageRole {
    pub const ALL: [StageRole; 4] = [
        StageRole::Planner,
        StageRole::Writer,
        StageRole::Editor,
        StageRole::Reviewer,
    ];

    /// Human label used to prefix messages derived from this role's steps
    pub fn label(self) -> &'static str {
        match self {
            StageRole::Planner => "Planner",
            StageRole::Writer => "Writer",
            StageRole::Editor => "Editor",
            StageRole::Reviewer => "Reviewer",
        }
    }
}

/// Display status of a single pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Waiting,
    Running,
    Completed,
}

// ============================================================================
// Trace
// ============================================================================

/// One unit of work performed by one pipeline role.
///
/// Steps are immutable once observed; the trace only grows. `loop_index` is
/// the structured revision counter; older pipelines embed a `loop:<n>` tag
/// in `notes` instead, which the progress estimator still reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub role: StageRole,
    pub action: AgentAction,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_index: Option<u32>,
}

/// The tagged payload of a trace step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentAction {
    /// Chat-style output: an internal thought and/or a user-facing message
    Chat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thought: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Proposed file modification, applied via the confirmation gate
    ModifyFile {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thought: Option<String>,
        file_path: String,
        original_content: String,
        new_content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        log_id: Option<String>,
    },
}

impl AgentAction {
    pub fn thought(&self) -> Option<&str> {
        match self {
            AgentAction::Chat { thought, .. } => thought.as_deref(),
            AgentAction::ModifyFile { thought, .. } => thought.as_deref(),
        }
    }
}

// ============================================================================
// Audit
// ============================================================================

/// Decision recorded for a proposed file modification, exactly once per log id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Approved,
    Rejected,
    AutoApproved,
}

impl AuditStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditStatus::Approved => "approved",
            AuditStatus::Rejected => "rejected",
            AuditStatus::AutoApproved => "auto_approved",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_round_trips_snake_case_tag() {
        let json = r#"{
            "type": "modify_file",
            "file_path": "ch01.md",
            "original_content": "old",
            "new_content": "new"
        }"#;

        let action: AgentAction = serde_json::from_str(json).unwrap();
        match &action {
            AgentAction::ModifyFile {
                thought,
                file_path,
                log_id,
                ..
            } => {
                assert!(thought.is_none());
                assert_eq!(file_path, "ch01.md");
                assert!(log_id.is_none());
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn chat_without_fields_deserializes() {
        let action: AgentAction = serde_json::from_str(r#"{"type": "chat"}"#).unwrap();
        assert!(action.thought().is_none());
    }

    #[test]
    fn terminal_statuses() {
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Error.is_terminal());
        assert!(!WorkflowStatus::Running.is_terminal());
        assert!(!WorkflowStatus::Paused.is_terminal());
    }
}
