// Agent Session Coordinator
// Submits a workflow, polls it at a fixed cadence, reduces the trace into
// messages, and routes the final action through the confirmation gate.

use crate::client::{ProjectHost, WorkflowApi};
use crate::config::{CoordinatorConfig, SubmitPolicy};
use crate::error::{MuseError, Result};
use crate::event_bus::EventBus;
use crate::gate::{ConfirmationGate, PatchProposal};
use crate::reducer::{MessageKind, ReducedMessage};
use crate::session::SessionStore;
use muse_observability::{emit_event, ObservabilityEvent, ProcessKind};
use muse_types::{AgentAction, CoordinatorEvent, SessionSnapshot, WorkflowStatus};
use muse_wire::{AppendChatMessageRequest, PollWorkflowResponse, StartWorkflowRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::Level;

/// Coordinates one agent session per editing context. Cheap to clone; all
/// state lives behind the inner `Arc`.
#[derive(Clone)]
pub struct SessionCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    api: Arc<dyn WorkflowApi>,
    host: Arc<dyn ProjectHost>,
    gate: Arc<ConfirmationGate>,
    bus: EventBus,
    config: CoordinatorConfig,
    project_ref: String,
    store: SessionStore,
    cancel: RwLock<Option<CancellationToken>>,
}

impl SessionCoordinator {
    pub fn new(
        api: Arc<dyn WorkflowApi>,
        host: Arc<dyn ProjectHost>,
        config: CoordinatorConfig,
        project_ref: String,
    ) -> Self {
        let bus = EventBus::new();
        let gate = Arc::new(ConfirmationGate::new(host.clone(), bus.clone()));
        Self {
            inner: Arc::new(CoordinatorInner {
                api,
                host,
                gate,
                bus,
                config,
                project_ref,
                store: SessionStore::new(),
                cancel: RwLock::new(None),
            }),
        }
    }

    pub fn events(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.inner.bus.subscribe()
    }

    pub fn gate(&self) -> &ConfirmationGate {
        &self.inner.gate
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.store.snapshot().await
    }

    /// Submit a workflow request and start polling.
    ///
    /// A second submission while one is running follows the configured
    /// policy: `Reject` fails with `SessionBusy`, `Replace` cancels the
    /// running poller first. The prior session is never silently orphaned.
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
        let default_max_loops = self.inner.config.max_loops_default;
        self.inner
            .store
            .with_state(|state| state.max_loops = Some(default_max_loops))
            .await;

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
                event: "session.submit",
                component: "coordinator",
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

    /// Abandon the running session: stop scheduling polls and clear the
    /// request id. An in-flight fetch is not aborted; its result is
    /// discarded when it resolves.
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
}

/// One fetch at a time: the next poll is scheduled only after the previous
/// fetch resolves, so polls never overlap even when fetches run long.
async fn poll_loop(inner: Arc<CoordinatorInner>, request_id: String, token: CancellationToken) {
    loop {
        if token.is_cancelled() {
            break;
        }

        let result = inner.api.poll_workflow(&request_id).await;

        if token.is_cancelled() {
            // Session was cleared while the fetch was in flight
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
                tracing::error!(request_id = %request_id, "workflow poll failed: {}", message);
                emit_event(
                    Level::ERROR,
                    ProcessKind::Desktop,
                    ObservabilityEvent {
                        event: "session.poll_failed",
                        component: "coordinator",
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
            _ = tokio::time::sleep(Duration::from_millis(inner.config.poll_interval_ms)) => {}
        }
    }
}

/// Process one poll result. Returns true when the session reached a
/// terminal status and polling must stop.
async fn handle_poll(
    inner: &Arc<CoordinatorInner>,
    request_id: &str,
    resp: PollWorkflowResponse,
) -> bool {
    let (messages, trace_grew) = inner
        .store
        .with_state(|state| state.absorb_trace(&resp.trace, resp.max_loops, resp.progress))
        .await;

    publish_messages(
        inner.host.as_ref(),
        &inner.bus,
        &inner.project_ref,
        request_id,
        &messages,
    )
    .await;

    if trace_grew || resp.progress.is_some() {
        let snapshot = inner.store.snapshot().await;
        inner.bus.publish(CoordinatorEvent::ProgressUpdated {
            request_id: request_id.to_string(),
            stages: snapshot.stages,
            loop_count: snapshot.loop_count,
            progress_percent: snapshot.progress_percent,
            timestamp: chrono::Utc::now(),
        });
    }

    match resp.status {
        WorkflowStatus::Completed => {
            finish_completed(inner, request_id, resp.final_action).await;
            true
        }
        WorkflowStatus::Error => {
            let message = resp.error.unwrap_or_else(|| "workflow failed".to_string());
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
        _ => false,
    }
}

/// Publish reduced messages on the bus and append each to the external chat
/// transcript. The append is fire-and-forget: a failure is logged and never
/// fails the poll cycle.
pub(crate) async fn publish_messages(
    host: &dyn ProjectHost,
    bus: &EventBus,
    project_ref: &str,
    request_id: &str,
    messages: &[ReducedMessage],
) {
    for message in messages {
        let event = match message.kind {
            MessageKind::StageThought => CoordinatorEvent::StageThought {
                request_id: request_id.to_string(),
                role: message.role,
                label: message.label.clone(),
                content: message.content.clone(),
                timestamp: chrono::Utc::now(),
            },
            MessageKind::Plan => CoordinatorEvent::PlanMessage {
                request_id: request_id.to_string(),
                content: message.content.clone(),
                timestamp: chrono::Utc::now(),
            },
        };
        bus.publish(event);

        let append = host
            .append_chat_message(AppendChatMessageRequest {
                project_ref: project_ref.to_string(),
                role: message.label.clone(),
                content: message.content.clone(),
            })
            .await;
        if let Err(e) = append {
            tracing::warn!(request_id = %request_id, "chat log append failed: {}", e);
        }
    }
}

async fn finish_completed(
    inner: &Arc<CoordinatorInner>,
    request_id: &str,
    final_action: Option<AgentAction>,
) {
    match final_action {
        Some(AgentAction::ModifyFile {
            file_path,
            original_content,
            new_content,
            log_id,
            ..
        }) => {
            let proposal = PatchProposal::new(
                request_id.to_string(),
                file_path,
                original_content,
                new_content,
                log_id,
            );
            if let Err(e) = inner
                .gate
                .submit(proposal, inner.config.auto_accept)
                .await
            {
                tracing::error!(request_id = %request_id, "patch routing failed: {}", e);
            }
        }
        Some(AgentAction::Chat { thought, message }) => {
            if let Some(content) = message.filter(|m| !m.is_empty()).or(thought) {
                inner.bus.publish(CoordinatorEvent::AssistantMessage {
                    request_id: request_id.to_string(),
                    content,
                    timestamp: chrono::Utc::now(),
                });
            }
        }
        None => {}
    }

    inner.store.release(WorkflowStatus::Completed, None).await;
    inner.bus.publish(CoordinatorEvent::SessionCompleted {
        request_id: request_id.to_string(),
        timestamp: chrono::Utc::now(),
    });
    emit_event(
        Level::INFO,
        ProcessKind::Desktop,
        ObservabilityEvent {
            event: "session.completed",
            component: "coordinator",
            request_id: Some(request_id),
            project_ref: Some(&inner.project_ref),
            document_ref: None,
            status: Some("completed"),
            error_code: None,
            detail: None,
        },
    );
}
