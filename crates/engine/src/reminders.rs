use serde::Serialize;
use tracing::{debug, info, warn};

use docflow_core::errors::WorkflowError;
use docflow_core::workflow::{ReminderBatch, ReminderTier};

use crate::service::WorkflowEngine;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReminderReport {
    pub notified_upcoming: usize,
    pub notified_urgent: usize,
    pub uploader_notices: usize,
    pub suppressed: usize,
    pub failed: usize,
    /// Ledger rows removed by retention pruning.
    pub pruned: u64,
}

impl WorkflowEngine {
    /// Sends batched deadline reminders for both tiers.
    ///
    /// Each batch claims its `(approver, tier)` slot in the ledger before it
    /// is delivered, so sweeps running in other processes against the same
    /// database send it at most once. A claim whose delivery fails is
    /// released and retried on the next run. Runs within one process are
    /// also serialized. Ledger rows past the retention period are pruned at
    /// the end of every run.
    pub async fn run_deadline_reminder_sweep(&self) -> Result<ReminderReport, WorkflowError> {
        let _serialized = self.reminder_sweep.lock().await;
        let now = self.clock.now();
        let policy = &self.reminder_policy;

        let due = self.queries.due_active_steps(now, now + policy.horizon()).await?;
        let lookback = policy.repeat_after(ReminderTier::Upcoming).max(policy.repeat_after(ReminderTier::Urgent));
        let last_sent = self.reminder_ledger.last_sent_since(now - lookback).await?;
        let plan = policy.plan(&due, now, &last_sent);

        let mut report = ReminderReport { suppressed: plan.suppressed.len(), ..ReminderReport::default() };
        for held in &plan.suppressed {
            debug!(
                event_name = "sweep.deadline_check.suppressed",
                approver = %held.approver,
                tier = held.tier.as_str(),
                documents = held.document_count,
                reason = ?held.reason,
                "deadline reminder held back"
            );
        }

        for batch in &plan.batches {
            let claim = self
                .reminder_ledger
                .claim(
                    &batch.approver,
                    batch.tier,
                    batch.documents.len(),
                    now,
                    policy.repeat_after(batch.tier),
                )
                .await;
            let claim_id = match claim {
                Ok(Some(claim_id)) => claim_id,
                Ok(None) => {
                    debug!(
                        event_name = "sweep.deadline_check.already_claimed",
                        approver = %batch.approver,
                        tier = batch.tier.as_str(),
                        "deadline reminder already sent by a concurrent sweep"
                    );
                    report.suppressed += 1;
                    continue;
                }
                Err(error) => {
                    warn!(
                        event_name = "sweep.deadline_check.claim_failed",
                        approver = %batch.approver,
                        tier = batch.tier.as_str(),
                        error = %error,
                        "could not claim reminder slot"
                    );
                    report.failed += 1;
                    continue;
                }
            };

            if let Err(error) = self.notifier.deadline_batch(batch).await {
                warn!(
                    event_name = "sweep.deadline_check.delivery_failed",
                    approver = %batch.approver,
                    tier = batch.tier.as_str(),
                    error = %error,
                    "deadline reminder not delivered"
                );
                report.failed += 1;
                if let Err(error) = self.reminder_ledger.release(claim_id).await {
                    warn!(
                        event_name = "sweep.deadline_check.release_failed",
                        approver = %batch.approver,
                        tier = batch.tier.as_str(),
                        error = %error,
                        "undelivered reminder stays claimed until its repeat window passes"
                    );
                }
                continue;
            }

            match batch.tier {
                ReminderTier::Upcoming => report.notified_upcoming += 1,
                ReminderTier::Urgent => {
                    report.notified_urgent += 1;
                    report.uploader_notices += self.notify_uploaders(batch).await;
                }
            }
        }

        match self.reminder_ledger.prune_before(policy.prune_cutoff(now)).await {
            Ok(pruned) => report.pruned = pruned,
            Err(error) => warn!(
                event_name = "sweep.deadline_check.prune_failed",
                error = %error,
                "reminder ledger was not pruned"
            ),
        }

        info!(
            event_name = "sweep.deadline_check.completed",
            due_steps = due.len(),
            notified_upcoming = report.notified_upcoming,
            notified_urgent = report.notified_urgent,
            uploader_notices = report.uploader_notices,
            suppressed = report.suppressed,
            failed = report.failed,
            pruned = report.pruned,
            "deadline reminder sweep finished"
        );
        Ok(report)
    }

    async fn notify_uploaders(&self, batch: &ReminderBatch) -> usize {
        let now = self.clock.now();
        let mut delivered = 0;
        for due in &batch.documents {
            match self.notifier.urgent_deadline_to_uploader(due, due.deadline - now).await {
                Ok(()) => delivered += 1,
                Err(error) => warn!(
                    event_name = "sweep.deadline_check.uploader_notice_failed",
                    correlation_id = %due.document_id,
                    owner = %due.owner,
                    error = %error,
                    "uploader deadline notice not delivered"
                ),
            }
        }
        delivered
    }
}
