// Session Store
// Holds the single in-flight workflow request for one editing context.

use muse_types::{SessionSnapshot, StageRole, WorkflowStatus};
use std::collections::HashSet;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub(crate) struct SessionState {
    pub request_id: Option<String>,
    pub status: WorkflowStatus,
    pub cursor: usize,
    /// Roles observed so far; a stage once completed is never demoted
    pub roles_seen: HashSet<StageRole>,
    pub last_role: Option<StageRole>,
    pub loop_count: u32,
    pub max_loops: Option<u32>,
    pub progress_percent: Option<u8>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error_message: Option<String>,
}

impl SessionState {
    /// Fold one poll's trace into the session: reduce the unseen suffix,
    /// accumulate observed roles, refresh loop/progress counters. Returns
    /// the reduced messages and whether the cursor advanced.
    pub(crate) fn absorb_trace(
        &mut self,
        trace: &[muse_types::TraceStep],
        max_loops: Option<u32>,
        progress: Option<u8>,
    ) -> (Vec<crate::reducer::ReducedMessage>, bool) {
        let cursor_before = self.cursor;
        let (messages, cursor) = crate::reducer::reduce_new_steps(trace, self.cursor);

        for step in trace.iter().skip(cursor_before.min(trace.len())) {
            self.roles_seen.insert(step.role);
        }
        if let Some(last) = trace.last() {
            self.last_role = Some(last.role);
        }

        self.cursor = cursor;
        self.loop_count = self.loop_count.max(crate::progress::loop_count(trace));
        if max_loops.is_some() {
            self.max_loops = max_loops;
        }
        if progress.is_some() {
            self.progress_percent = progress;
        }

        (messages, cursor > cursor_before)
    }

    fn idle() -> Self {
        Self {
            request_id: None,
            status: WorkflowStatus::Idle,
            cursor: 0,
            roles_seen: HashSet::new(),
            last_role: None,
            loop_count: 0,
            max_loops: None,
            progress_percent: None,
            started_at: None,
            ended_at: None,
            error_message: None,
        }
    }
}

/// Owner of the session state. At most one workflow request is in flight;
/// all mutation goes through these methods.
pub struct SessionStore {
    state: RwLock<SessionState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SessionState::idle()),
        }
    }

    /// Record a freshly submitted request and reset per-session state
    pub async fn begin(&self, request_id: String) {
        let mut state = self.state.write().await;
        *state = SessionState::idle();
        state.request_id = Some(request_id);
        state.status = WorkflowStatus::Running;
        state.started_at = Some(chrono::Utc::now());
    }

    pub async fn is_running(&self) -> bool {
        let state = self.state.read().await;
        state.status == WorkflowStatus::Running || state.status == WorkflowStatus::Paused
    }

    pub async fn request_id(&self) -> Option<String> {
        self.state.read().await.request_id.clone()
    }

    /// Drop the request id without touching the rest of the display state.
    /// Used on terminal status: the UI keeps showing the outcome.
    pub async fn release(&self, status: WorkflowStatus, error: Option<String>) {
        let mut state = self.state.write().await;
        state.request_id = None;
        state.status = status;
        state.error_message = error;
        state.ended_at = Some(chrono::Utc::now());
    }

    /// Abandon the session entirely
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        *state = SessionState::idle();
    }

    pub async fn set_status(&self, status: WorkflowStatus) {
        self.state.write().await.status = status;
    }

    pub(crate) async fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.state.write().await;
        f(&mut state)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read().await;
        let running = state.status == WorkflowStatus::Running;
        let stages = crate::progress::stage_statuses(&state.roles_seen, state.last_role, running);
        SessionSnapshot {
            request_id: state.request_id.clone(),
            status: state.status,
            cursor: state.cursor,
            stages,
            loop_count: state.loop_count,
            max_loops: state.max_loops,
            progress_percent: state.progress_percent,
            started_at: state.started_at,
            ended_at: state.ended_at,
            error_message: state.error_message.clone(),
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
