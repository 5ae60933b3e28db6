use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use docflow_core::domain::document_type::DocumentTypeId;
use docflow_core::errors::WorkflowError;
use docflow_db::repositories::OverdueStep;

use crate::service::{commit, WorkflowEngine};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AutoApproveReport {
    pub approved: usize,
    /// Candidates that were no longer eligible once their document was locked.
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SkipSweepReport {
    pub examined: usize,
    pub skipped_steps: usize,
    pub completed_documents: usize,
    pub failed: usize,
}

enum ItemOutcome {
    Approved,
    Ineligible,
}

impl WorkflowEngine {
    /// Auto-approves every active step whose deadline has passed.
    ///
    /// Each candidate is handled in its own lock and transaction; a failing
    /// item is counted and the sweep moves on. Only a failure to list the
    /// candidates fails the whole run.
    pub async fn run_auto_approve_sweep(&self) -> Result<AutoApproveReport, WorkflowError> {
        let now = self.clock.now();
        let candidates = self.queries.overdue_active_steps(now).await?;
        let mut hours_by_type: HashMap<DocumentTypeId, u32> = HashMap::new();
        let mut report = AutoApproveReport::default();

        for candidate in &candidates {
            let result = match self.deadline_hours(&mut hours_by_type, &candidate.document_type_id).await {
                Ok(hours) => self.auto_approve_one(candidate, hours, now).await,
                Err(error) => Err(error),
            };

            match result {
                Ok(ItemOutcome::Approved) => report.approved += 1,
                Ok(ItemOutcome::Ineligible) => report.skipped += 1,
                Err(error) if error.is_structural() => {
                    debug!(
                        event_name = "sweep.auto_approve.item_ineligible",
                        correlation_id = %candidate.document_id,
                        step_order = candidate.step_order,
                        error_class = error.class(),
                        error = %error,
                        "overdue step no longer eligible"
                    );
                    report.skipped += 1;
                }
                Err(error) => {
                    warn!(
                        event_name = "sweep.auto_approve.item_failed",
                        correlation_id = %candidate.document_id,
                        step_order = candidate.step_order,
                        error_class = error.class(),
                        error = %error,
                        "auto-approval failed for overdue step"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            event_name = "sweep.auto_approve.completed",
            candidates = candidates.len(),
            approved = report.approved,
            skipped = report.skipped,
            failed = report.failed,
            "auto-approve sweep finished"
        );
        Ok(report)
    }

    /// Skips unassigned active steps across every stalled document.
    pub async fn run_skip_unassigned_sweep(&self) -> Result<SkipSweepReport, WorkflowError> {
        let stalled = self.queries.stalled_documents().await?;
        let mut report = SkipSweepReport::default();

        for document_id in &stalled {
            report.examined += 1;
            match self.skip_unassigned(document_id).await {
                Ok(pass) => {
                    report.skipped_steps += pass.skipped_steps.len();
                    if pass.completed {
                        report.completed_documents += 1;
                    }
                }
                Err(error) => {
                    warn!(
                        event_name = "sweep.skip_unassigned.item_failed",
                        correlation_id = %document_id,
                        error_class = error.class(),
                        error = %error,
                        "skip pass failed"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            event_name = "sweep.skip_unassigned.completed",
            examined = report.examined,
            skipped_steps = report.skipped_steps,
            completed_documents = report.completed_documents,
            failed = report.failed,
            "skip-unassigned sweep finished"
        );
        Ok(report)
    }

    async fn auto_approve_one(
        &self,
        candidate: &OverdueStep,
        deadline_hours: u32,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome, WorkflowError> {
        let _guard = self.locks.acquire(&candidate.document_id).await;
        let mut tx = self.store.begin().await?;
        let mut workflow = self.load(&mut tx, &candidate.document_id).await?;

        if workflow.document.current_step != candidate.step_order {
            return Ok(ItemOutcome::Ineligible);
        }

        // An overdue step nobody can act on is skipped, not auto-approved.
        if workflow.current().is_some_and(|step| step.approver.is_none()) {
            let pass = workflow.skip_unassigned(now);
            if pass.changed() {
                self.store.save(&mut tx, &workflow).await?;
                commit(tx).await?;
                self.dispatch(&workflow.document, &pass.effects).await;
            }
            return Ok(ItemOutcome::Ineligible);
        }

        let transition = workflow.auto_approve(deadline_hours, now)?;
        self.store.save(&mut tx, &workflow).await?;
        self.store.append_log(&mut tx, &transition.log).await?;
        commit(tx).await?;

        info!(
            event_name = "workflow.step.auto_approved",
            correlation_id = %workflow.document.id,
            step_order = candidate.step_order,
            overdue_minutes = (now - candidate.deadline).num_minutes(),
            outcome = ?transition.outcome,
            "overdue step auto-approved"
        );

        self.dispatch(&workflow.document, &transition.effects).await;
        Ok(ItemOutcome::Approved)
    }

    /// Deadline hours for steps activated by auto-approval. Looked up before
    /// the item's transaction opens and cached for the rest of the sweep.
    async fn deadline_hours(
        &self,
        cache: &mut HashMap<DocumentTypeId, u32>,
        document_type_id: &DocumentTypeId,
    ) -> Result<u32, WorkflowError> {
        if let Some(hours) = cache.get(document_type_id) {
            return Ok(*hours);
        }

        let hours = match self.document_types.find_by_id(document_type_id).await? {
            Some(document_type) => self.policy.deadline_hours_for(&document_type),
            None => self.policy.default_deadline_hours,
        };
        cache.insert(document_type_id.clone(), hours);
        Ok(hours)
    }
}
