// Wire-format models for the Muse workflow API.
//
// Field names here are the client-side coordination contract; the remote
// pipeline is opaque beyond these shapes.

use muse_types::{AgentAction, AuditStatus, TodoItem, TodoItemPatch, TraceStep, WorkflowStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartWorkflowRequest {
    /// Reference to the stored AI model configuration
    pub model_ref: String,
    /// Project/document context the pipeline reasons over
    pub context_ref: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_file_snapshot: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartWorkflowResponse {
    pub request_id: String,
}

/// State of a running workflow as observed by one poll.
///
/// `trace` is the full append-only step sequence; the reducer consumes only
/// the suffix past its cursor. `final_action` is present exactly when
/// `status` is `completed`; `error` exactly when `status` is `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollWorkflowResponse {
    pub status: WorkflowStatus,
    #[serde(default)]
    pub trace: Vec<TraceStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_action: Option<AgentAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_loops: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

/// Planner poll payload: the workflow shape plus the live to-do list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollPlannerResponse {
    pub status: WorkflowStatus,
    #[serde(default)]
    pub trace: Vec<TraceStep>,
    #[serde(default)]
    pub todos: Vec<TodoItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseWorkflowRequest {
    pub paused: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTodoItemRequest {
    pub id: String,
    pub fields: TodoItemPatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendChatMessageRequest {
    pub project_ref: String,
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAuditStatusRequest {
    pub log_id: String,
    pub status: AuditStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyDocumentRequest {
    pub document_ref: String,
    pub content: String,
}

/// Empty acknowledgement body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ack {}
