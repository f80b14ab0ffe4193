// Task-Planner Coordinator
// Structurally parallel to the session coordinator, specialized for the
// to-do list workflow: pause/resume and per-item status edits.

use crate::client::{ProjectHost, WorkflowApi};
use crate::config::{CoordinatorConfig, SubmitPolicy};
use crate::coordinator::publish_messages;
use crate::error::{MuseError, Result};
use crate::event_bus::EventBus;
use crate::progress;
use crate::session::SessionStore;
use muse_observability::{emit_event, ObservabilityEvent, ProcessKind};
use muse_types::{
    CoordinatorEvent, SessionSnapshot, TodoItem, TodoItemPatch, TodoStatus, WorkflowStatus,
};
use muse_wire::{PollPlannerResponse, StartWorkflowRequest, UpdateTodoItemRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::Level;

#[derive(Clone)]
pub struct PlannerCoordinator {
    inner: Arc<PlannerInner>,
}

struct PlannerInner {
    api: Arc<dyn WorkflowApi>,
    host: Arc<dyn ProjectHost>,
    bus: EventBus,
    config: CoordinatorConfig,
    project_ref: String,
    store: SessionStore,
    todos: RwLock<Vec<TodoItem>>,
    cancel: RwLock<Option<CancellationToken>>,
}

impl PlannerCoordinator {
    pub fn new(
        api: Arc<dyn WorkflowApi>,
        host: Arc<dyn ProjectHost>,
        config: CoordinatorConfig,
        project_ref: String,
    ) -> Self {
        Self {
            inner: Arc::new(PlannerInner {
                api,
                host,
                bus: EventBus::new(),
                config,
                project_ref,
                store: SessionStore::new(),
                todos: RwLock::new(Vec::new()),
                cancel: RwLock::new(None),
            }),
        }
    }

    pub fn events(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.inner.bus.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.store.snapshot().await
    }

    pub async fn todos(&self) -> Vec<TodoItem> {
        self.inner.todos.read().await.clone()
    }

    /// Submit a planning workflow and start polling, under the same
    /// concurrent-submission policy as the agent session.
    pub async fn submit(&self, req: StartWorkflowRequest) -> Result<String> {
        if self.inner.store.is_running().await {
            match self.inner.config.submit_policy {
                SubmitPolicy::Reject => return Err(MuseError::SessionBusy),
                SubmitPolicy::Replace => self.cancel_session().await,
            }
        }

        let resp = self.inner.api.start_workflow(req).await?;
        let request_id = resp.request_id;

        self.inner.store.begin(request_id.clone()).await;
        self.inner.todos.write().await.clear();

        let token = CancellationToken::new();
        *self.inner.cancel.write().await = Some(token.clone());

        self.inner.bus.publish(CoordinatorEvent::SessionSubmitted {
            request_id: request_id.clone(),
            timestamp: chrono::Utc::now(),
        });
        emit_event(
            Level::INFO,
            ProcessKind::Desktop,
            ObservabilityEvent {
                event: "planner.submit",
                component: "planner",
                request_id: Some(&request_id),
                project_ref: Some(&self.inner.project_ref),
                document_ref: None,
                status: Some("running"),
                error_code: None,
                detail: None,
            },
        );

        let inner = self.inner.clone();
        let loop_request_id = request_id.clone();
        tokio::spawn(async move {
            poll_loop(inner, loop_request_id, token).await;
        });

        Ok(request_id)
    }

    /// Toggle between Running and Paused without terminating the session.
    /// The trace and cursor are untouched; polling continues so a resume is
    /// picked up where the pipeline left off.
    pub async fn pause(&self, paused: bool) -> Result<()> {
        let request_id = self
            .inner
            .store
            .request_id()
            .await
            .ok_or(MuseError::NoActiveSession)?;

        self.inner.api.pause_workflow(&request_id, paused).await?;

        let status = if paused {
            WorkflowStatus::Paused
        } else {
            WorkflowStatus::Running
        };
        self.inner.store.set_status(status).await;

        let event = if paused {
            CoordinatorEvent::SessionPaused {
                request_id,
                timestamp: chrono::Utc::now(),
            }
        } else {
            CoordinatorEvent::SessionResumed {
                request_id,
                timestamp: chrono::Utc::now(),
            }
        };
        self.inner.bus.publish(event);
        Ok(())
    }

    /// Optimistic partial update of exactly one item by id, forwarded to the
    /// pipeline. Retrying with the same id and fields converges on the same
    /// state.
    pub async fn update_item(&self, id: &str, fields: TodoItemPatch) -> Result<()> {
        let request_id = self
            .inner
            .store
            .request_id()
            .await
            .ok_or(MuseError::NoActiveSession)?;

        {
            let mut todos = self.inner.todos.write().await;
            if let Some(item) = todos.iter_mut().find(|t| t.id == id) {
                item.apply_patch(&fields);
            }
        }
        self.publish_todos(&request_id).await;

        self.inner
            .api
            .update_todo_item(
                &request_id,
                UpdateTodoItemRequest {
                    id: id.to_string(),
                    fields,
                },
            )
            .await?;
        Ok(())
    }

    /// Abandon the running session; an in-flight fetch is discarded when it
    /// resolves.
    pub async fn cancel_session(&self) {
        let token = self.inner.cancel.write().await.take();
        if let Some(token) = token {
            token.cancel();
        }

        if let Some(request_id) = self.inner.store.request_id().await {
            self.inner.bus.publish(CoordinatorEvent::SessionCancelled {
                request_id,
                timestamp: chrono::Utc::now(),
            });
        }
        self.inner.store.clear().await;
    }

    async fn publish_todos(&self, request_id: &str) {
        publish_todo_update(&self.inner, request_id).await;
    }
}

async fn publish_todo_update(inner: &Arc<PlannerInner>, request_id: &str) {
    let todos = inner.todos.read().await.clone();
    let completed = todos
        .iter()
        .filter(|t| t.status == TodoStatus::Completed)
        .count();
    let percent = progress::completion_percent(completed, todos.len());

    inner
        .store
        .with_state(|state| state.progress_percent = Some(percent))
        .await;

    inner.bus.publish(CoordinatorEvent::TodoListUpdated {
        request_id: request_id.to_string(),
        items: todos,
        timestamp: chrono::Utc::now(),
    });
}

async fn poll_loop(inner: Arc<PlannerInner>, request_id: String, token: CancellationToken) {
    loop {
        if token.is_cancelled() {
            break;
        }

        let result = inner.api.poll_planner(&request_id).await;

        if token.is_cancelled() {
            tracing::debug!(request_id = %request_id, "discarding poll result for cancelled session");
            break;
        }

        match result {
            Ok(resp) => {
                if handle_poll(&inner, &request_id, resp).await {
                    break;
                }
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(request_id = %request_id, "planner poll failed: {}", message);
                emit_event(
                    Level::ERROR,
                    ProcessKind::Desktop,
                    ObservabilityEvent {
                        event: "planner.poll_failed",
                        component: "planner",
                        request_id: Some(&request_id),
                        project_ref: Some(&inner.project_ref),
                        document_ref: None,
                        status: Some("error"),
                        error_code: Some("TRANSPORT"),
                        detail: Some(&message),
                    },
                );
                inner
                    .store
                    .release(WorkflowStatus::Error, Some(message.clone()))
                    .await;
                inner.bus.publish(CoordinatorEvent::SessionFailed {
                    request_id: request_id.clone(),
                    error: message,
                    timestamp: chrono::Utc::now(),
                });
                break;
            }
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_millis(inner.config.planner_poll_interval_ms)) => {}
        }
    }
}

async fn handle_poll(
    inner: &Arc<PlannerInner>,
    request_id: &str,
    resp: PollPlannerResponse,
) -> bool {
    let (messages, _) = inner
        .store
        .with_state(|state| state.absorb_trace(&resp.trace, None, resp.progress))
        .await;

    publish_messages(
        inner.host.as_ref(),
        &inner.bus,
        &inner.project_ref,
        request_id,
        &messages,
    )
    .await;

    let todos_changed = {
        let mut todos = inner.todos.write().await;
        if *todos != resp.todos && !resp.todos.is_empty() {
            *todos = resp.todos.clone();
            true
        } else {
            false
        }
    };
    if todos_changed {
        publish_todo_update(inner, request_id).await;
    }

    match resp.status {
        WorkflowStatus::Completed => {
            inner.store.release(WorkflowStatus::Completed, None).await;
            inner.bus.publish(CoordinatorEvent::SessionCompleted {
                request_id: request_id.to_string(),
                timestamp: chrono::Utc::now(),
            });
            true
        }
        WorkflowStatus::Error => {
            let message = resp.error.unwrap_or_else(|| "planner failed".to_string());
            inner
                .store
                .release(WorkflowStatus::Error, Some(message.clone()))
                .await;
            inner.bus.publish(CoordinatorEvent::SessionFailed {
                request_id: request_id.to_string(),
                error: message,
                timestamp: chrono::Utc::now(),
            });
            true
        }
        // Paused sessions keep polling: the trace and cursor stay put until
        // the pipeline resumes appending.
        _ => false,
    }
}

