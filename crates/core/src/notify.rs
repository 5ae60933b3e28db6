//! Outbound notifications and the completion hook.
//!
//! Delivery is best effort: callers dispatch only after the triggering
//! change is committed and log failures instead of surfacing them.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Duration;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::domain::directory::UserId;
use crate::domain::document::{Document, DocumentId};
use crate::workflow::reminders::{DueStep, ReminderBatch, ReminderTier};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),
    #[error("notification rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn approval_needed(
        &self,
        document: &Document,
        approver: &UserId,
        step_order: u32,
    ) -> Result<(), DeliveryError>;

    async fn document_approved(&self, document: &Document) -> Result<(), DeliveryError>;

    async fn document_rejected(
        &self,
        document: &Document,
        rejected_by: &UserId,
        reason: &str,
    ) -> Result<(), DeliveryError>;

    /// Tells the approver who missed a deadline that the step moved on
    /// without them.
    async fn auto_approved(
        &self,
        document: &Document,
        missed_approver: Option<&UserId>,
        step_order: u32,
    ) -> Result<(), DeliveryError>;

    async fn deadline_batch(&self, batch: &ReminderBatch) -> Result<(), DeliveryError>;

    /// Heads-up to the uploader that their document is close to being
    /// auto-approved past an idle approver.
    async fn urgent_deadline_to_uploader(
        &self,
        due: &DueStep,
        remaining: Duration,
    ) -> Result<(), DeliveryError>;
}

/// Invoked once per document when its final step completes.
#[async_trait]
pub trait CompletionHook: Send + Sync {
    async fn on_fully_approved(&self, document: &Document) -> Result<(), DeliveryError>;
}

/// Gateway that records every notification as a structured log event.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationGateway for TracingNotifier {
    async fn approval_needed(
        &self,
        document: &Document,
        approver: &UserId,
        step_order: u32,
    ) -> Result<(), DeliveryError> {
        info!(
            event_name = "notify.approval_needed",
            document_id = %document.id,
            approver = %approver,
            step_order,
            title = %document.title,
            "approval requested"
        );
        Ok(())
    }

    async fn document_approved(&self, document: &Document) -> Result<(), DeliveryError> {
        info!(
            event_name = "notify.document_approved",
            document_id = %document.id,
            owner = %document.owner,
            "document fully approved"
        );
        Ok(())
    }

    async fn document_rejected(
        &self,
        document: &Document,
        rejected_by: &UserId,
        reason: &str,
    ) -> Result<(), DeliveryError> {
        info!(
            event_name = "notify.document_rejected",
            document_id = %document.id,
            owner = %document.owner,
            rejected_by = %rejected_by,
            reason,
            "document rejected"
        );
        Ok(())
    }

    async fn auto_approved(
        &self,
        document: &Document,
        missed_approver: Option<&UserId>,
        step_order: u32,
    ) -> Result<(), DeliveryError> {
        info!(
            event_name = "notify.auto_approved",
            document_id = %document.id,
            missed_approver = missed_approver.map(|user| user.0.as_str()).unwrap_or("-"),
            step_order,
            "step auto-approved after deadline"
        );
        Ok(())
    }

    async fn deadline_batch(&self, batch: &ReminderBatch) -> Result<(), DeliveryError> {
        info!(
            event_name = "notify.deadline_batch",
            approver = %batch.approver,
            tier = batch.tier.as_str(),
            document_count = batch.documents.len(),
            remaining_minutes = batch.remaining.num_minutes(),
            summary = %batch.summary(),
            "deadline reminder"
        );
        Ok(())
    }

    async fn urgent_deadline_to_uploader(
        &self,
        due: &DueStep,
        remaining: Duration,
    ) -> Result<(), DeliveryError> {
        info!(
            event_name = "notify.urgent_deadline_uploader",
            document_id = %due.document_id,
            owner = %due.owner,
            approver = %due.approver,
            remaining_minutes = remaining.num_minutes(),
            "approval deadline close"
        );
        Ok(())
    }
}

#[async_trait]
impl CompletionHook for TracingNotifier {
    async fn on_fully_approved(&self, document: &Document) -> Result<(), DeliveryError> {
        info!(
            event_name = "document.verification_artifact.requested",
            document_id = %document.id,
            verification_code = %document.verification_code.0,
            "verification artifact requested"
        );
        Ok(())
    }
}

/// One captured call on [`RecordingNotifier`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    ApprovalNeeded { document_id: DocumentId, approver: UserId, step_order: u32 },
    DocumentApproved { document_id: DocumentId, owner: UserId },
    DocumentRejected { document_id: DocumentId, rejected_by: UserId, reason: String },
    AutoApproved { document_id: DocumentId, missed_approver: Option<UserId>, step_order: u32 },
    DeadlineBatch { approver: UserId, tier: ReminderTier, document_ids: Vec<DocumentId> },
    UrgentDeadlineToUploader { document_id: DocumentId, owner: UserId },
    Completed { document_id: DocumentId },
}

/// In-memory gateway for tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway that records each attempt and then reports it undeliverable.
    pub fn failing() -> Self {
        Self { sent: Mutex::new(Vec::new()), failing: true }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clear();
    }

    fn record(&self, notification: Notification) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(notification);
        if self.failing {
            return Err(DeliveryError::Unavailable("recording notifier set to fail".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationGateway for RecordingNotifier {
    async fn approval_needed(
        &self,
        document: &Document,
        approver: &UserId,
        step_order: u32,
    ) -> Result<(), DeliveryError> {
        self.record(Notification::ApprovalNeeded {
            document_id: document.id.clone(),
            approver: approver.clone(),
            step_order,
        })
    }

    async fn document_approved(&self, document: &Document) -> Result<(), DeliveryError> {
        self.record(Notification::DocumentApproved {
            document_id: document.id.clone(),
            owner: document.owner.clone(),
        })
    }

    async fn document_rejected(
        &self,
        document: &Document,
        rejected_by: &UserId,
        reason: &str,
    ) -> Result<(), DeliveryError> {
        self.record(Notification::DocumentRejected {
            document_id: document.id.clone(),
            rejected_by: rejected_by.clone(),
            reason: reason.to_string(),
        })
    }

    async fn auto_approved(
        &self,
        document: &Document,
        missed_approver: Option<&UserId>,
        step_order: u32,
    ) -> Result<(), DeliveryError> {
        self.record(Notification::AutoApproved {
            document_id: document.id.clone(),
            missed_approver: missed_approver.cloned(),
            step_order,
        })
    }

    async fn deadline_batch(&self, batch: &ReminderBatch) -> Result<(), DeliveryError> {
        self.record(Notification::DeadlineBatch {
            approver: batch.approver.clone(),
            tier: batch.tier,
            document_ids: batch.documents.iter().map(|due| due.document_id.clone()).collect(),
        })
    }

    async fn urgent_deadline_to_uploader(
        &self,
        due: &DueStep,
        _remaining: Duration,
    ) -> Result<(), DeliveryError> {
        self.record(Notification::UrgentDeadlineToUploader {
            document_id: due.document_id.clone(),
            owner: due.owner.clone(),
        })
    }
}

#[async_trait]
impl CompletionHook for RecordingNotifier {
    async fn on_fully_approved(&self, document: &Document) -> Result<(), DeliveryError> {
        self.record(Notification::Completed { document_id: document.id.clone() })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use crate::domain::directory::UserId;
    use crate::domain::document::{
        Document, DocumentContext, DocumentId, DocumentStatus, VerificationCode,
    };
    use crate::domain::document_type::DocumentTypeId;

    use super::{CompletionHook, DeliveryError, Notification, NotificationGateway, RecordingNotifier};

    fn document() -> Document {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).single().expect("valid timestamp");
        Document {
            id: DocumentId("doc-1".to_string()),
            uuid: Uuid::nil(),
            verification_code: VerificationCode("AB12".to_string()),
            document_type_id: DocumentTypeId("memo".to_string()),
            title: "Budget memo".to_string(),
            owner: UserId("uploader".to_string()),
            context: DocumentContext::default(),
            status: DocumentStatus::Approved,
            current_step: 1,
            created_at: now,
            completed_at: Some(now),
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn recording_notifier_keeps_call_order() {
        let notifier = RecordingNotifier::new();
        let document = document();

        notifier
            .approval_needed(&document, &UserId("head".to_string()), 0)
            .await
            .expect("recording succeeds");
        notifier.on_fully_approved(&document).await.expect("recording succeeds");

        assert_eq!(
            notifier.sent(),
            vec![
                Notification::ApprovalNeeded {
                    document_id: document.id.clone(),
                    approver: UserId("head".to_string()),
                    step_order: 0,
                },
                Notification::Completed { document_id: document.id.clone() },
            ]
        );
    }

    #[tokio::test]
    async fn failing_notifier_records_then_errors() {
        let notifier = RecordingNotifier::failing();
        let error = notifier
            .document_approved(&document())
            .await
            .expect_err("failing notifier must error");

        assert!(matches!(error, DeliveryError::Unavailable(_)));
        assert_eq!(notifier.sent().len(), 1);
    }
}
