use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use docflow_core::domain::approval::{
    ApprovalAction, ApprovalLog, ApprovalLogId, ApprovalStep, ApprovalStepId, ClientMetadata,
};
use docflow_core::domain::directory::UserId;
use docflow_core::domain::document::{Document, DocumentId, VerificationCode};
use docflow_core::domain::document_type::DocumentTypeId;
use docflow_core::domain::role::RoleTag;
use docflow_core::workflow::DueStep;

use super::workflow::{document_from_row, step_from_row, DOCUMENT_COLUMNS, STEP_COLUMNS};
use super::{format_timestamp, parse_timestamp, parse_u32, RepositoryError};
use crate::DbPool;

/// An active step waiting on a specific approver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PendingApproval {
    pub document_id: DocumentId,
    pub title: String,
    pub owner: UserId,
    pub step_order: u32,
    pub role_required: RoleTag,
    pub deadline: DateTime<Utc>,
    pub total_steps: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DocumentHistory {
    pub document: Document,
    pub steps: Vec<ApprovalStep>,
    pub log: Vec<ApprovalLog>,
}

/// The active step of a document whose deadline has passed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverdueStep {
    pub document_id: DocumentId,
    pub document_type_id: DocumentTypeId,
    pub step_order: u32,
    pub deadline: DateTime<Utc>,
}

/// Read-only lookups over documents and their active steps.
#[derive(Clone)]
pub struct SqlWorkflowQueries {
    pool: DbPool,
}

impl SqlWorkflowQueries {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_document(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        let query = format!("SELECT {DOCUMENT_COLUMNS} FROM document d WHERE d.id = ?");
        sqlx::query(&query)
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(document_from_row)
            .transpose()
    }

    pub async fn find_by_verification_code(
        &self,
        code: &VerificationCode,
    ) -> Result<Option<Document>, RepositoryError> {
        let query = format!("SELECT {DOCUMENT_COLUMNS} FROM document d WHERE d.verification_code = ?");
        sqlx::query(&query)
            .bind(&code.0)
            .fetch_optional(&self.pool)
            .await?
            .map(document_from_row)
            .transpose()
    }

    pub async fn history(&self, id: &DocumentId) -> Result<Option<DocumentHistory>, RepositoryError> {
        let Some(document) = self.find_document(id).await? else {
            return Ok(None);
        };

        let query = format!(
            "SELECT {STEP_COLUMNS} FROM approval_step s WHERE s.document_id = ? ORDER BY s.step_order"
        );
        let steps = sqlx::query(&query)
            .bind(&id.0)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(step_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let log = sqlx::query(
            "SELECT id, document_id, step_id, actor_user_id, action, comment,
                    ip_address, user_agent, recorded_at
             FROM approval_log
             WHERE document_id = ?
             ORDER BY recorded_at ASC, rowid ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(log_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(DocumentHistory { document, steps, log }))
    }

    pub async fn pending_for_approver(
        &self,
        approver: &UserId,
    ) -> Result<Vec<PendingApproval>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT d.id AS document_id, d.title, d.owner_user_id, s.step_order, s.role_required,
                    s.deadline,
                    (SELECT COUNT(*) FROM approval_step t WHERE t.document_id = d.id) AS total_steps
             FROM approval_step s
             JOIN document d ON d.id = s.document_id
             WHERE s.approver_user_id = ?
               AND s.status = 'pending'
               AND d.status = 'pending_approval'
               AND s.step_order = d.current_step
             ORDER BY s.deadline ASC, d.id ASC",
        )
        .bind(&approver.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<PendingApproval, RepositoryError> {
                Ok(PendingApproval {
                    document_id: DocumentId(row.try_get("document_id")?),
                    title: row.try_get("title")?,
                    owner: UserId(row.try_get("owner_user_id")?),
                    step_order: parse_u32("step_order", row.try_get("step_order")?)?,
                    role_required: RoleTag::parse(&row.try_get::<String, _>("role_required")?),
                    deadline: parse_timestamp("deadline", row.try_get("deadline")?)?,
                    total_steps: parse_u32("total_steps", row.try_get("total_steps")?)?,
                })
            })
            .collect()
    }

    /// Active pending steps whose deadline lies strictly before `now`.
    /// Later pending placeholders are never returned.
    pub async fn overdue_active_steps(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<OverdueStep>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT s.document_id, d.document_type_id, s.step_order, s.deadline
             FROM approval_step s
             JOIN document d ON d.id = s.document_id
             WHERE s.status = 'pending'
               AND s.deadline < ?
               AND d.status = 'pending_approval'
               AND s.step_order = d.current_step
             ORDER BY s.deadline ASC, s.document_id ASC",
        )
        .bind(format_timestamp(now))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<OverdueStep, RepositoryError> {
                Ok(OverdueStep {
                    document_id: DocumentId(row.try_get("document_id")?),
                    document_type_id: DocumentTypeId(row.try_get("document_type_id")?),
                    step_order: parse_u32("step_order", row.try_get("step_order")?)?,
                    deadline: parse_timestamp("deadline", row.try_get("deadline")?)?,
                })
            })
            .collect()
    }

    /// Documents awaiting approval whose active step has no approver or has
    /// already been acted on.
    pub async fn stalled_documents(&self) -> Result<Vec<DocumentId>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT d.id
             FROM document d
             JOIN approval_step s ON s.document_id = d.id AND s.step_order = d.current_step
             WHERE d.status = 'pending_approval'
               AND (s.approver_user_id IS NULL OR s.status <> 'pending')
             ORDER BY d.id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<DocumentId, RepositoryError> { Ok(DocumentId(row.try_get("id")?)) })
            .collect()
    }

    /// Assigned active steps with a deadline in `(now, until]`.
    pub async fn due_active_steps(
        &self,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<DueStep>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT d.id AS document_id, d.title, d.owner_user_id, s.step_order,
                    s.approver_user_id, s.deadline
             FROM approval_step s
             JOIN document d ON d.id = s.document_id
             WHERE s.status = 'pending'
               AND s.approver_user_id IS NOT NULL
               AND d.status = 'pending_approval'
               AND s.step_order = d.current_step
               AND s.deadline > ?
               AND s.deadline <= ?
             ORDER BY s.approver_user_id ASC, s.deadline ASC",
        )
        .bind(format_timestamp(now))
        .bind(format_timestamp(until))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<DueStep, RepositoryError> {
                Ok(DueStep {
                    document_id: DocumentId(row.try_get("document_id")?),
                    title: row.try_get("title")?,
                    owner: UserId(row.try_get("owner_user_id")?),
                    step_order: parse_u32("step_order", row.try_get("step_order")?)?,
                    approver: UserId(row.try_get("approver_user_id")?),
                    deadline: parse_timestamp("deadline", row.try_get("deadline")?)?,
                })
            })
            .collect()
    }
}

fn log_from_row(row: SqliteRow) -> Result<ApprovalLog, RepositoryError> {
    let action_raw = row.try_get::<String, _>("action")?;
    let action = ApprovalAction::parse(&action_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown log action `{action_raw}`")))?;

    Ok(ApprovalLog {
        id: ApprovalLogId(row.try_get("id")?),
        document_id: DocumentId(row.try_get("document_id")?),
        step_id: ApprovalStepId(row.try_get("step_id")?),
        actor: row.try_get::<Option<String>, _>("actor_user_id")?.map(UserId),
        action,
        comment: row.try_get("comment")?,
        client: ClientMetadata {
            ip_address: row.try_get("ip_address")?,
            user_agent: row.try_get("user_agent")?,
        },
        recorded_at: parse_timestamp("recorded_at", row.try_get("recorded_at")?)?,
    })
}
