use async_trait::async_trait;
use muse_core::{
    ConfirmationGate, CoordinatorConfig, MuseError, ProjectHost, SessionCoordinator, SubmitPolicy,
    WorkflowApi,
};
use muse_types::{AgentAction, AuditStatus, CoordinatorEvent, StageRole, TraceStep, WorkflowStatus};
use muse_wire::{
    Ack, AppendChatMessageRequest, ApplyDocumentRequest, PollPlannerResponse, PollWorkflowResponse,
    StartWorkflowRequest, StartWorkflowResponse, UpdateAuditStatusRequest, UpdateTodoItemRequest,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

fn chat_step(role: StageRole, thought: &str) -> TraceStep {
    TraceStep {
        role,
        action: AgentAction::Chat {
            thought: Some(thought.to_string()),
            message: None,
        },
        notes: String::new(),
        loop_index: None,
    }
}

fn plan_step(thought: &str, message: &str) -> TraceStep {
    TraceStep {
        role: StageRole::Planner,
        action: AgentAction::Chat {
            thought: Some(thought.to_string()),
            message: Some(message.to_string()),
        },
        notes: String::new(),
        loop_index: None,
    }
}

/// Serves a fixed script of poll responses; the last entry repeats forever.
struct ScriptedApi {
    script: Vec<PollWorkflowResponse>,
    polls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    poll_delay: Duration,
}

impl ScriptedApi {
    fn new(script: Vec<PollWorkflowResponse>) -> Self {
        Self {
            script,
            polls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            poll_delay: Duration::from_millis(0),
        }
    }

    fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }
}

#[async_trait]
impl WorkflowApi for ScriptedApi {
    async fn start_workflow(&self, _req: StartWorkflowRequest) -> Result<StartWorkflowResponse, MuseError> {
        Ok(StartWorkflowResponse {
            request_id: "req_test".to_string(),
        })
    }

    async fn poll_workflow(&self, _request_id: &str) -> Result<PollWorkflowResponse, MuseError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.poll_delay.is_zero() {
            tokio::time::sleep(self.poll_delay).await;
        }
        let idx = self.polls.fetch_add(1, Ordering::SeqCst);
        let resp = self.script[idx.min(self.script.len() - 1)].clone();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(resp)
    }

    async fn poll_planner(&self, _request_id: &str) -> Result<PollPlannerResponse, MuseError> {
        unimplemented!("not used by the agent session")
    }

    async fn pause_workflow(&self, _request_id: &str, _paused: bool) -> Result<Ack, MuseError> {
        Ok(Ack::default())
    }

    async fn update_todo_item(
        &self,
        _request_id: &str,
        _req: UpdateTodoItemRequest,
    ) -> Result<Ack, MuseError> {
        Ok(Ack::default())
    }
}

struct RecordingHost {
    content: Mutex<String>,
    appends: Mutex<Vec<String>>,
    audits: Mutex<Vec<(String, AuditStatus)>>,
    applies: AtomicUsize,
}

impl RecordingHost {
    fn new(content: &str) -> Self {
        Self {
            content: Mutex::new(content.to_string()),
            appends: Mutex::new(Vec::new()),
            audits: Mutex::new(Vec::new()),
            applies: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ProjectHost for RecordingHost {
    async fn append_chat_message(&self, req: AppendChatMessageRequest) -> Result<Ack, MuseError> {
        self.appends
            .lock()
            .await
            .push(format!("{}: {}", req.role, req.content));
        Ok(Ack::default())
    }

    async fn update_audit_status(&self, req: UpdateAuditStatusRequest) -> Result<Ack, MuseError> {
        self.audits.lock().await.push((req.log_id, req.status));
        Ok(Ack::default())
    }

    async fn current_document_content(&self, _document_ref: &str) -> Result<String, MuseError> {
        Ok(self.content.lock().await.clone())
    }

    async fn apply_document_content(&self, req: ApplyDocumentRequest) -> Result<Ack, MuseError> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        *self.content.lock().await = req.content;
        Ok(Ack::default())
    }
}

fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig {
        poll_interval_ms: 5,
        planner_poll_interval_ms: 5,
        ..CoordinatorConfig::default()
    }
}

fn start_request() -> StartWorkflowRequest {
    StartWorkflowRequest {
        model_ref: "model_1".to_string(),
        context_ref: "project_1".to_string(),
        message: "polish chapter one".to_string(),
        current_file_snapshot: Some("ABCXYZ".to_string()),
    }
}

async fn drain_until_terminal(
    rx: &mut tokio::sync::broadcast::Receiver<CoordinatorEvent>,
) -> Vec<CoordinatorEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("coordinator did not reach a terminal status")
            .expect("event channel closed");
        let terminal = matches!(
            event,
            CoordinatorEvent::SessionCompleted { .. } | CoordinatorEvent::SessionFailed { .. }
        );
        events.push(event);
        if terminal {
            return events;
        }
    }
}

#[tokio::test]
async fn full_session_emits_each_message_once_and_applies_patch() {
    // Poll 1 and 2 deliver the same two-step prefix; poll 3 grows the trace
    // and completes with a file modification.
    let two_steps = vec![
        plan_step("outline the revision", "plan: tighten the opening"),
        chat_step(StageRole::Writer, "rewriting the first paragraph"),
    ];
    let mut full = two_steps.clone();
    full.push(chat_step(StageRole::Editor, "checking tone"));

    let api = Arc::new(ScriptedApi::new(vec![
        PollWorkflowResponse {
            status: WorkflowStatus::Running,
            trace: two_steps.clone(),
            final_action: None,
            error: None,
            max_loops: Some(5),
            progress: None,
        },
        PollWorkflowResponse {
            status: WorkflowStatus::Running,
            trace: two_steps,
            final_action: None,
            error: None,
            max_loops: None,
            progress: None,
        },
        PollWorkflowResponse {
            status: WorkflowStatus::Completed,
            trace: full,
            final_action: Some(AgentAction::ModifyFile {
                thought: None,
                file_path: "ch01.md".to_string(),
                original_content: "BCX".to_string(),
                new_content: "Q".to_string(),
                log_id: Some("log_42".to_string()),
            }),
            error: None,
            max_loops: None,
            progress: None,
        },
    ]));
    let host = Arc::new(RecordingHost::new("ABCXYZ"));

    let config = CoordinatorConfig {
        auto_accept: true,
        ..fast_config()
    };
    let coordinator = SessionCoordinator::new(
        api.clone(),
        host.clone(),
        config,
        "project_1".to_string(),
    );
    let mut rx = coordinator.events();

    coordinator.submit(start_request()).await.unwrap();
    let events = drain_until_terminal(&mut rx).await;

    // Exactly one thought per step and one plan message, despite the
    // re-delivered prefix on poll 2.
    let thoughts = events
        .iter()
        .filter(|e| matches!(e, CoordinatorEvent::StageThought { .. }))
        .count();
    let plans = events
        .iter()
        .filter(|e| matches!(e, CoordinatorEvent::PlanMessage { .. }))
        .count();
    assert_eq!(thoughts, 3);
    assert_eq!(plans, 1);
    assert_eq!(host.appends.lock().await.len(), 4);

    // Patch auto-applied with a single audit write.
    assert_eq!(*host.content.lock().await, "AQYZ");
    assert_eq!(host.applies.load(Ordering::SeqCst), 1);
    assert_eq!(
        *host.audits.lock().await,
        vec![("log_42".to_string(), AuditStatus::AutoApproved)]
    );

    // Terminal state released the request id but kept the outcome.
    let snap = coordinator.snapshot().await;
    assert!(snap.request_id.is_none());
    assert_eq!(snap.status, WorkflowStatus::Completed);
    assert_eq!(snap.cursor, 3);
    assert_eq!(snap.loop_count, 0);
    assert_eq!(snap.max_loops, Some(5));
}

#[tokio::test]
async fn polls_never_overlap() {
    let api = Arc::new(
        ScriptedApi::new(vec![PollWorkflowResponse {
            status: WorkflowStatus::Running,
            trace: Vec::new(),
            final_action: None,
            error: None,
            max_loops: None,
            progress: None,
        }])
        .with_poll_delay(Duration::from_millis(20)),
    );
    let host = Arc::new(RecordingHost::new(""));

    let coordinator =
        SessionCoordinator::new(api.clone(), host, fast_config(), "project_1".to_string());
    coordinator.submit(start_request()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    coordinator.cancel_session().await;

    assert!(api.polls.load(Ordering::SeqCst) >= 2);
    assert_eq!(api.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancellation_stops_polling_and_discards_in_flight_fetch() {
    let api = Arc::new(
        ScriptedApi::new(vec![PollWorkflowResponse {
            status: WorkflowStatus::Running,
            trace: vec![chat_step(StageRole::Writer, "still drafting")],
            final_action: None,
            error: None,
            max_loops: None,
            progress: None,
        }])
        .with_poll_delay(Duration::from_millis(50)),
    );
    let host = Arc::new(RecordingHost::new(""));

    let coordinator =
        SessionCoordinator::new(api.clone(), host.clone(), fast_config(), "project_1".to_string());
    coordinator.submit(start_request()).await.unwrap();

    // Cancel while the first fetch is still in flight.
    tokio::time::sleep(Duration::from_millis(10)).await;
    coordinator.cancel_session().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let polls_after_cancel = api.polls.load(Ordering::SeqCst);
    assert!(polls_after_cancel <= 1);
    // The in-flight result was discarded: nothing was reduced.
    assert!(host.appends.lock().await.is_empty());

    let snap = coordinator.snapshot().await;
    assert!(snap.request_id.is_none());
    assert_eq!(snap.status, WorkflowStatus::Idle);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(api.polls.load(Ordering::SeqCst), polls_after_cancel);
}

#[tokio::test]
async fn transport_failure_is_terminal_without_retry() {
    struct FailingApi {
        polls: AtomicUsize,
    }

    #[async_trait]
    impl WorkflowApi for FailingApi {
        async fn start_workflow(
            &self,
            _req: StartWorkflowRequest,
        ) -> Result<StartWorkflowResponse, MuseError> {
            Ok(StartWorkflowResponse {
                request_id: "req_fail".to_string(),
            })
        }

        async fn poll_workflow(
            &self,
            _request_id: &str,
        ) -> Result<PollWorkflowResponse, MuseError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Err(MuseError::Transport("connection refused".to_string()))
        }

        async fn poll_planner(&self, _request_id: &str) -> Result<PollPlannerResponse, MuseError> {
            unimplemented!()
        }

        async fn pause_workflow(&self, _request_id: &str, _paused: bool) -> Result<Ack, MuseError> {
            Ok(Ack::default())
        }

        async fn update_todo_item(
            &self,
            _request_id: &str,
            _req: UpdateTodoItemRequest,
        ) -> Result<Ack, MuseError> {
            Ok(Ack::default())
        }
    }

    let api = Arc::new(FailingApi {
        polls: AtomicUsize::new(0),
    });
    let host = Arc::new(RecordingHost::new(""));

    let coordinator =
        SessionCoordinator::new(api.clone(), host, fast_config(), "project_1".to_string());
    let mut rx = coordinator.events();
    coordinator.submit(start_request()).await.unwrap();

    let events = drain_until_terminal(&mut rx).await;
    assert!(events
        .iter()
        .any(|e| matches!(e, CoordinatorEvent::SessionFailed { error, .. } if error.contains("connection refused"))));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(api.polls.load(Ordering::SeqCst), 1);

    let snap = coordinator.snapshot().await;
    assert!(snap.request_id.is_none());
    assert_eq!(snap.status, WorkflowStatus::Error);
}

#[tokio::test]
async fn pipeline_error_surfaces_message_verbatim() {
    let api = Arc::new(ScriptedApi::new(vec![PollWorkflowResponse {
        status: WorkflowStatus::Error,
        trace: Vec::new(),
        final_action: None,
        error: Some("model quota exhausted".to_string()),
        max_loops: None,
        progress: None,
    }]));
    let host = Arc::new(RecordingHost::new(""));

    let coordinator =
        SessionCoordinator::new(api, host, fast_config(), "project_1".to_string());
    let mut rx = coordinator.events();
    coordinator.submit(start_request()).await.unwrap();

    let events = drain_until_terminal(&mut rx).await;
    assert!(events.iter().any(|e| matches!(
        e,
        CoordinatorEvent::SessionFailed { error, .. } if error == "model quota exhausted"
    )));
}

#[tokio::test]
async fn reject_policy_refuses_concurrent_submission() {
    let api = Arc::new(
        ScriptedApi::new(vec![PollWorkflowResponse {
            status: WorkflowStatus::Running,
            trace: Vec::new(),
            final_action: None,
            error: None,
            max_loops: None,
            progress: None,
        }])
        .with_poll_delay(Duration::from_millis(10)),
    );
    let host = Arc::new(RecordingHost::new(""));

    let coordinator =
        SessionCoordinator::new(api, host, fast_config(), "project_1".to_string());
    coordinator.submit(start_request()).await.unwrap();

    let second = coordinator.submit(start_request()).await;
    assert!(matches!(second, Err(MuseError::SessionBusy)));

    coordinator.cancel_session().await;
}

#[tokio::test]
async fn replace_policy_cancels_prior_session() {
    let api = Arc::new(
        ScriptedApi::new(vec![PollWorkflowResponse {
            status: WorkflowStatus::Running,
            trace: Vec::new(),
            final_action: None,
            error: None,
            max_loops: None,
            progress: None,
        }])
        .with_poll_delay(Duration::from_millis(10)),
    );
    let host = Arc::new(RecordingHost::new(""));

    let config = CoordinatorConfig {
        submit_policy: SubmitPolicy::Replace,
        ..fast_config()
    };
    let coordinator = SessionCoordinator::new(api, host, config, "project_1".to_string());
    let mut rx = coordinator.events();

    coordinator.submit(start_request()).await.unwrap();
    coordinator.submit(start_request()).await.unwrap();

    // The first session was cancelled, not orphaned.
    let mut cancelled = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, CoordinatorEvent::SessionCancelled { .. }) {
            cancelled += 1;
        }
    }
    assert_eq!(cancelled, 1);

    coordinator.cancel_session().await;
}

#[tokio::test]
async fn chat_log_append_failure_does_not_fail_the_session() {
    struct FlakyLogHost;

    #[async_trait]
    impl ProjectHost for FlakyLogHost {
        async fn append_chat_message(
            &self,
            _req: AppendChatMessageRequest,
        ) -> Result<Ack, MuseError> {
            Err(MuseError::Transport("transcript store down".to_string()))
        }

        async fn update_audit_status(
            &self,
            _req: UpdateAuditStatusRequest,
        ) -> Result<Ack, MuseError> {
            Ok(Ack::default())
        }

        async fn current_document_content(&self, _document_ref: &str) -> Result<String, MuseError> {
            Ok(String::new())
        }

        async fn apply_document_content(&self, _req: ApplyDocumentRequest) -> Result<Ack, MuseError> {
            Ok(Ack::default())
        }
    }

    let api = Arc::new(ScriptedApi::new(vec![
        PollWorkflowResponse {
            status: WorkflowStatus::Running,
            trace: vec![chat_step(StageRole::Writer, "drafting")],
            final_action: None,
            error: None,
            max_loops: None,
            progress: None,
        },
        PollWorkflowResponse {
            status: WorkflowStatus::Completed,
            trace: vec![chat_step(StageRole::Writer, "drafting")],
            final_action: Some(AgentAction::Chat {
                thought: None,
                message: Some("all done".to_string()),
            }),
            error: None,
            max_loops: None,
            progress: None,
        },
    ]));

    let coordinator = SessionCoordinator::new(
        api,
        Arc::new(FlakyLogHost),
        fast_config(),
        "project_1".to_string(),
    );
    let mut rx = coordinator.events();
    coordinator.submit(start_request()).await.unwrap();

    let events = drain_until_terminal(&mut rx).await;

    // The thought was still surfaced and the session still completed.
    assert!(events
        .iter()
        .any(|e| matches!(e, CoordinatorEvent::StageThought { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        CoordinatorEvent::AssistantMessage { content, .. } if content == "all done"
    )));
    assert_eq!(
        coordinator.snapshot().await.status,
        WorkflowStatus::Completed
    );
}

#[tokio::test]
async fn manual_review_path_holds_patch_for_approval() {
    let api = Arc::new(ScriptedApi::new(vec![PollWorkflowResponse {
        status: WorkflowStatus::Completed,
        trace: Vec::new(),
        final_action: Some(AgentAction::ModifyFile {
            thought: None,
            file_path: "ch01.md".to_string(),
            original_content: "BCX".to_string(),
            new_content: "Q".to_string(),
            log_id: Some("log_9".to_string()),
        }),
        error: None,
        max_loops: None,
        progress: None,
    }]));
    let host = Arc::new(RecordingHost::new("ABCXYZ"));

    // auto_accept stays false: the patch must wait for the operator.
    let coordinator = SessionCoordinator::new(
        api,
        host.clone(),
        fast_config(),
        "project_1".to_string(),
    );
    let mut rx = coordinator.events();
    coordinator.submit(start_request()).await.unwrap();
    drain_until_terminal(&mut rx).await;

    assert_eq!(host.applies.load(Ordering::SeqCst), 0);
    let gate: &ConfirmationGate = coordinator.gate();
    assert!(gate.pending().await.is_some());

    gate.approve().await.unwrap();
    assert_eq!(*host.content.lock().await, "AQYZ");
    assert_eq!(
        *host.audits.lock().await,
        vec![("log_9".to_string(), AuditStatus::Approved)]
    );
}
