// Workflow API Client
// Collaborator contracts consumed by the coordinators, plus the HTTP
// implementation used by the desktop app.

use crate::error::{MuseError, Result};
use async_trait::async_trait;
use muse_wire::{
    Ack, AppendChatMessageRequest, ApplyDocumentRequest, PollPlannerResponse,
    PollWorkflowResponse, StartWorkflowRequest, StartWorkflowResponse, UpdateAuditStatusRequest,
    UpdateTodoItemRequest,
};
use reqwest::Client;

/// Remote pipeline contract: submit, observe, pause, and edit workflows.
#[async_trait]
pub trait WorkflowApi: Send + Sync {
    async fn start_workflow(&self, req: StartWorkflowRequest) -> Result<StartWorkflowResponse>;
    async fn poll_workflow(&self, request_id: &str) -> Result<PollWorkflowResponse>;
    async fn poll_planner(&self, request_id: &str) -> Result<PollPlannerResponse>;
    async fn pause_workflow(&self, request_id: &str, paused: bool) -> Result<Ack>;
    async fn update_todo_item(&self, request_id: &str, req: UpdateTodoItemRequest) -> Result<Ack>;
}

/// Project-side collaborators: the chat transcript, the audit log, and the
/// live document. The coordinator treats the chat log as write-only and the
/// audit log as write-exactly-once per log id.
#[async_trait]
pub trait ProjectHost: Send + Sync {
    async fn append_chat_message(&self, req: AppendChatMessageRequest) -> Result<Ack>;
    async fn update_audit_status(&self, req: UpdateAuditStatusRequest) -> Result<Ack>;
    /// Live content the reconciler runs against
    async fn current_document_content(&self, document_ref: &str) -> Result<String>;
    async fn apply_document_content(&self, req: ApplyDocumentRequest) -> Result<Ack>;
}

/// HTTP implementation of the workflow API
#[derive(Clone)]
pub struct HttpWorkflowApi {
    base_url: String,
    client: Client,
}

impl HttpWorkflowApi {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: Client::new(),
        }
    }

    pub async fn check_health(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        let resp = self.client.get(&url).send().await?;
        Ok(resp.status().is_success())
    }
}

#[async_trait]
impl WorkflowApi for HttpWorkflowApi {
    async fn start_workflow(&self, req: StartWorkflowRequest) -> Result<StartWorkflowResponse> {
        let url = format!("{}/api/workflow", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| MuseError::Transport(e.to_string()))?;
        Ok(resp.json::<StartWorkflowResponse>().await?)
    }

    async fn poll_workflow(&self, request_id: &str) -> Result<PollWorkflowResponse> {
        let url = format!("{}/api/workflow/{}", self.base_url, request_id);
        let resp = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| MuseError::Transport(e.to_string()))?;
        Ok(resp.json::<PollWorkflowResponse>().await?)
    }

    async fn poll_planner(&self, request_id: &str) -> Result<PollPlannerResponse> {
        let url = format!("{}/api/planner/{}", self.base_url, request_id);
        let resp = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| MuseError::Transport(e.to_string()))?;
        Ok(resp.json::<PollPlannerResponse>().await?)
    }

    async fn pause_workflow(&self, request_id: &str, paused: bool) -> Result<Ack> {
        let url = format!("{}/api/planner/{}/pause", self.base_url, request_id);
        let resp = self
            .client
            .post(&url)
            .json(&muse_wire::PauseWorkflowRequest { paused })
            .send()
            .await?
            .error_for_status()
            .map_err(|e| MuseError::Transport(e.to_string()))?;
        Ok(resp.json::<Ack>().await?)
    }

    async fn update_todo_item(&self, request_id: &str, req: UpdateTodoItemRequest) -> Result<Ack> {
        let url = format!("{}/api/planner/{}/todos", self.base_url, request_id);
        let resp = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| MuseError::Transport(e.to_string()))?;
        Ok(resp.json::<Ack>().await?)
    }
}
