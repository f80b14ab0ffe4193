// Confirmation Gate
// Decides whether a reconciled patch is applied automatically or held for
// operator approval, and records every decision in the audit log.

use crate::client::ProjectHost;
use crate::error::{MuseError, Result};
use crate::event_bus::EventBus;
use crate::reconcile::{reconcile, ReconcileOutcome};
use muse_observability::{emit_event, ObservabilityEvent, ProcessKind};
use muse_types::{AuditStatus, CoordinatorEvent};
use muse_wire::{ApplyDocumentRequest, UpdateAuditStatusRequest};
use similar::TextDiff;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::Level;

/// Lifecycle of one proposed file modification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalState {
    Proposed,
    AutoApplying,
    Applied,
    PendingReview,
    Rejected,
}

/// A proposed file modification awaiting a gate decision
#[derive(Debug, Clone)]
pub struct PatchProposal {
    pub id: String,
    pub request_id: String,
    pub file_path: String,
    pub original_content: String,
    pub new_content: String,
    pub log_id: Option<String>,
    pub state: ProposalState,
    pub diff_preview: Option<String>,
    pub requested_at: chrono::DateTime<chrono::Utc>,
}

impl PatchProposal {
    pub fn new(
        request_id: String,
        file_path: String,
        original_content: String,
        new_content: String,
        log_id: Option<String>,
    ) -> Self {
        Self {
            id: format!(
                "patch_{}",
                &uuid::Uuid::new_v4().to_string().replace('-', "")[..16]
            ),
            request_id,
            file_path,
            original_content,
            new_content,
            log_id,
            state: ProposalState::Proposed,
            diff_preview: None,
            requested_at: chrono::Utc::now(),
        }
    }

    fn render_diff(&self) -> String {
        TextDiff::from_lines(&self.original_content, &self.new_content)
            .unified_diff()
            .context_radius(3)
            .to_string()
    }
}

/// Gate over the document write path. Holds at most one pending proposal and
/// serializes apply/approve/reject through a single in-flight guard.
pub struct ConfirmationGate {
    host: Arc<dyn ProjectHost>,
    bus: EventBus,
    pending: RwLock<Option<PatchProposal>>,
    is_applying: AtomicBool,
}

impl ConfirmationGate {
    pub fn new(host: Arc<dyn ProjectHost>, bus: EventBus) -> Self {
        Self {
            host,
            bus,
            pending: RwLock::new(None),
            is_applying: AtomicBool::new(false),
        }
    }

    /// The proposal currently awaiting operator review, if any
    pub async fn pending(&self) -> Option<PatchProposal> {
        self.pending.read().await.clone()
    }

    /// Route a fresh proposal per the auto-accept policy.
    ///
    /// `auto_accept = true` reconciles and applies immediately; a
    /// reconciliation miss downgrades to pending review instead of dropping
    /// the proposal. `auto_accept = false` always holds for review.
    pub async fn submit(&self, mut proposal: PatchProposal, auto_accept: bool) -> Result<ProposalState> {
        self.bus.publish(CoordinatorEvent::PatchProposed {
            request_id: proposal.request_id.clone(),
            proposal_id: proposal.id.clone(),
            file_path: proposal.file_path.clone(),
            timestamp: chrono::Utc::now(),
        });

        if !auto_accept {
            return self.hold_for_review(proposal).await;
        }

        let _guard = self.begin_apply()?;
        proposal.state = ProposalState::AutoApplying;

        let current = self
            .host
            .current_document_content(&proposal.file_path)
            .await?;

        match reconcile(&current, &proposal.original_content, &proposal.new_content) {
            ReconcileOutcome::Applied(content) => {
                self.apply_and_audit(&mut proposal, content, AuditStatus::AutoApproved)
                    .await?;
                Ok(ProposalState::Applied)
            }
            ReconcileOutcome::NotFound => {
                tracing::warn!(
                    file_path = %proposal.file_path,
                    "auto-apply could not locate original content, holding for review"
                );
                self.hold_for_review(proposal).await
            }
        }
    }

    /// Operator approval: reconcile against current live content and apply.
    /// If the content has drifted past reconciliation, the proposal stays
    /// pending with a refreshed diff.
    pub async fn approve(&self) -> Result<ProposalState> {
        let _guard = self.begin_apply()?;

        let mut proposal = self
            .pending
            .write()
            .await
            .take()
            .ok_or(MuseError::NoPendingProposal)?;

        let current = self
            .host
            .current_document_content(&proposal.file_path)
            .await?;

        match reconcile(&current, &proposal.original_content, &proposal.new_content) {
            ReconcileOutcome::Applied(content) => {
                self.apply_and_audit(&mut proposal, content, AuditStatus::Approved)
                    .await?;
                Ok(ProposalState::Applied)
            }
            ReconcileOutcome::NotFound => self.hold_for_review(proposal).await,
        }
    }

    /// Operator rejection: record the decision and discard without touching
    /// document content.
    pub async fn reject(&self) -> Result<ProposalState> {
        let _guard = self.begin_apply()?;

        let mut proposal = self
            .pending
            .write()
            .await
            .take()
            .ok_or(MuseError::NoPendingProposal)?;
        proposal.state = ProposalState::Rejected;

        self.write_audit(&proposal, AuditStatus::Rejected).await;

        self.bus.publish(CoordinatorEvent::PatchRejected {
            proposal_id: proposal.id.clone(),
            file_path: proposal.file_path.clone(),
            timestamp: chrono::Utc::now(),
        });
        emit_event(
            Level::INFO,
            ProcessKind::Desktop,
            ObservabilityEvent {
                event: "gate.decision",
                component: "gate",
                request_id: Some(&proposal.request_id),
                project_ref: None,
                document_ref: Some(&proposal.file_path),
                status: Some(AuditStatus::Rejected.as_str()),
                error_code: None,
                detail: None,
            },
        );
        Ok(ProposalState::Rejected)
    }

    async fn hold_for_review(&self, mut proposal: PatchProposal) -> Result<ProposalState> {
        proposal.state = ProposalState::PendingReview;
        proposal.diff_preview = Some(proposal.render_diff());

        self.bus.publish(CoordinatorEvent::PatchPendingReview {
            proposal_id: proposal.id.clone(),
            file_path: proposal.file_path.clone(),
            diff_preview: proposal.diff_preview.clone().unwrap_or_default(),
            timestamp: chrono::Utc::now(),
        });

        *self.pending.write().await = Some(proposal);
        Ok(ProposalState::PendingReview)
    }

    async fn apply_and_audit(
        &self,
        proposal: &mut PatchProposal,
        content: String,
        status: AuditStatus,
    ) -> Result<()> {
        self.host
            .apply_document_content(ApplyDocumentRequest {
                document_ref: proposal.file_path.clone(),
                content,
            })
            .await?;
        proposal.state = ProposalState::Applied;

        self.write_audit(proposal, status).await;

        self.bus.publish(CoordinatorEvent::PatchApplied {
            proposal_id: proposal.id.clone(),
            file_path: proposal.file_path.clone(),
            auto: status == AuditStatus::AutoApproved,
            timestamp: chrono::Utc::now(),
        });
        emit_event(
            Level::INFO,
            ProcessKind::Desktop,
            ObservabilityEvent {
                event: "gate.decision",
                component: "gate",
                request_id: Some(&proposal.request_id),
                project_ref: None,
                document_ref: Some(&proposal.file_path),
                status: Some(status.as_str()),
                error_code: None,
                detail: None,
            },
        );
        Ok(())
    }

    /// Audit entries are keyed by the pipeline's log id; a proposal without
    /// one has nowhere to record a decision and is skipped.
    async fn write_audit(&self, proposal: &PatchProposal, status: AuditStatus) {
        let Some(log_id) = &proposal.log_id else {
            return;
        };
        if let Err(e) = self
            .host
            .update_audit_status(UpdateAuditStatusRequest {
                log_id: log_id.clone(),
                status,
            })
            .await
        {
            tracing::warn!(log_id = %log_id, "audit status write failed: {}", e);
        }
    }

    fn begin_apply(&self) -> Result<ApplyGuard<'_>> {
        if self
            .is_applying
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(MuseError::ApplyInFlight);
        }
        Ok(ApplyGuard { gate: self })
    }
}

/// Releases the in-flight flag on every exit path
struct ApplyGuard<'a> {
    gate: &'a ConfirmationGate,
}

impl Drop for ApplyGuard<'_> {
    fn drop(&mut self) {
        self.gate.is_applying.store(false, Ordering::SeqCst);
    }
}
