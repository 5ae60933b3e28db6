use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use uuid::Uuid;

use docflow_core::domain::approval::{
    ApprovalLog, ApprovalStep, ApprovalStepId, StepStatus,
};
use docflow_core::domain::directory::UserId;
use docflow_core::domain::document::{
    Document, DocumentContext, DocumentId, DocumentStatus, VerificationCode,
};
use docflow_core::domain::document_type::DocumentTypeId;
use docflow_core::domain::role::RoleTag;
use docflow_core::workflow::DocumentWorkflow;

use super::{format_timestamp, parse_optional_timestamp, parse_timestamp, parse_u32, RepositoryError};
use crate::connection::{begin_immediate, DbPool, DbTransaction};

pub(crate) const DOCUMENT_COLUMNS: &str = "d.id, d.uuid, d.verification_code, d.document_type_id,
    d.owner_user_id, d.title, d.subject_id, d.group_id, d.academic_term_id, d.status,
    d.current_step, d.created_at, d.completed_at, d.updated_at";

pub(crate) const STEP_COLUMNS: &str = "s.id, s.document_id, s.step_order, s.role_required,
    s.approver_user_id, s.status, s.deadline, s.approved_at, s.comment";

/// Transactional store for the document aggregate.
///
/// Every write goes through a caller-owned [`DbTransaction`] so one
/// transition commits or rolls back as a unit.
#[derive(Clone)]
pub struct SqlWorkflowRepository {
    pool: DbPool,
}

impl SqlWorkflowRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn begin(&self) -> Result<DbTransaction, RepositoryError> {
        Ok(begin_immediate(&self.pool).await?)
    }

    pub async fn load(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: &DocumentId,
    ) -> Result<Option<DocumentWorkflow>, RepositoryError> {
        let query = format!("SELECT {DOCUMENT_COLUMNS} FROM document d WHERE d.id = ?");
        let Some(row) = sqlx::query(&query).bind(&id.0).fetch_optional(&mut **tx).await? else {
            return Ok(None);
        };
        let document = document_from_row(row)?;

        let query = format!(
            "SELECT {STEP_COLUMNS} FROM approval_step s WHERE s.document_id = ? ORDER BY s.step_order"
        );
        let steps = sqlx::query(&query)
            .bind(&id.0)
            .fetch_all(&mut **tx)
            .await?
            .into_iter()
            .map(step_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        DocumentWorkflow::from_parts(document, steps)
            .map(Some)
            .map_err(|error| RepositoryError::Decode(error.to_string()))
    }

    pub async fn verification_code_taken(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        code: &VerificationCode,
    ) -> Result<bool, RepositoryError> {
        let count: i64 =
            sqlx::query("SELECT COUNT(*) AS count FROM document WHERE verification_code = ?")
                .bind(&code.0)
                .fetch_one(&mut **tx)
                .await?
                .try_get("count")?;
        Ok(count > 0)
    }

    /// Persists a freshly created workflow: the document row and all steps.
    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        workflow: &DocumentWorkflow,
    ) -> Result<(), RepositoryError> {
        let document = &workflow.document;
        sqlx::query(
            "INSERT INTO document (
                id, uuid, verification_code, document_type_id, owner_user_id, title,
                subject_id, group_id, academic_term_id, status, current_step,
                created_at, completed_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&document.id.0)
        .bind(document.uuid.to_string())
        .bind(&document.verification_code.0)
        .bind(&document.document_type_id.0)
        .bind(&document.owner.0)
        .bind(&document.title)
        .bind(&document.context.subject_id)
        .bind(&document.context.group_id)
        .bind(&document.context.academic_term_id)
        .bind(document.status.as_str())
        .bind(i64::from(document.current_step))
        .bind(format_timestamp(document.created_at))
        .bind(document.completed_at.map(format_timestamp))
        .bind(format_timestamp(document.updated_at))
        .execute(&mut **tx)
        .await?;

        for step in &workflow.steps {
            sqlx::query(
                "INSERT INTO approval_step (
                    id, document_id, step_order, role_required, approver_user_id,
                    status, deadline, approved_at, comment
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&step.id.0)
            .bind(&step.document_id.0)
            .bind(i64::from(step.step_order))
            .bind(step.role_required.as_str())
            .bind(step.approver.as_ref().map(|user| user.0.as_str()))
            .bind(step.status.as_str())
            .bind(format_timestamp(step.deadline))
            .bind(step.approved_at.map(format_timestamp))
            .bind(&step.comment)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    /// Writes back a transition applied to a loaded workflow.
    ///
    /// Only steps that were still pending in storage are updated and the
    /// document's `current_step` never moves backwards; either guard failing
    /// reports a conflict and the caller rolls back.
    pub async fn save(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        workflow: &DocumentWorkflow,
    ) -> Result<(), RepositoryError> {
        let document = &workflow.document;

        for step in workflow.changed_steps() {
            let updated = sqlx::query(
                "UPDATE approval_step
                 SET status = ?, approver_user_id = ?, deadline = ?, approved_at = ?, comment = ?
                 WHERE id = ? AND status = 'pending'",
            )
            .bind(step.status.as_str())
            .bind(step.approver.as_ref().map(|user| user.0.as_str()))
            .bind(format_timestamp(step.deadline))
            .bind(step.approved_at.map(format_timestamp))
            .bind(&step.comment)
            .bind(&step.id.0)
            .execute(&mut **tx)
            .await?;

            if updated.rows_affected() == 0 {
                let status = stored_step_status(tx, &step.id).await?;
                return Err(RepositoryError::Conflict {
                    document_id: document.id.0.clone(),
                    step_order: step.step_order,
                    status,
                });
            }
        }

        let updated = sqlx::query(
            "UPDATE document
             SET status = ?, current_step = ?, completed_at = ?, updated_at = ?
             WHERE id = ? AND current_step <= ?",
        )
        .bind(document.status.as_str())
        .bind(i64::from(document.current_step))
        .bind(document.completed_at.map(format_timestamp))
        .bind(format_timestamp(document.updated_at))
        .bind(&document.id.0)
        .bind(i64::from(document.current_step))
        .execute(&mut **tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::Decode(format!(
                "document {} is missing or already past step {}",
                document.id, document.current_step
            )));
        }

        Ok(())
    }

    pub async fn append_log(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        log: &ApprovalLog,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO approval_log (
                id, document_id, step_id, actor_user_id, action, comment,
                ip_address, user_agent, recorded_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&log.id.0)
        .bind(&log.document_id.0)
        .bind(&log.step_id.0)
        .bind(log.actor.as_ref().map(|user| user.0.as_str()))
        .bind(log.action.as_str())
        .bind(&log.comment)
        .bind(&log.client.ip_address)
        .bind(&log.client.user_agent)
        .bind(format_timestamp(log.recorded_at))
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

async fn stored_step_status(
    tx: &mut Transaction<'_, Sqlite>,
    id: &ApprovalStepId,
) -> Result<StepStatus, RepositoryError> {
    let raw: String = sqlx::query("SELECT status FROM approval_step WHERE id = ?")
        .bind(&id.0)
        .fetch_one(&mut **tx)
        .await?
        .try_get("status")?;
    StepStatus::parse(&raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown step status `{raw}`")))
}

pub(crate) fn document_from_row(row: SqliteRow) -> Result<Document, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = DocumentStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown document status `{status_raw}`")))?;
    let uuid_raw = row.try_get::<String, _>("uuid")?;
    let uuid = Uuid::parse_str(&uuid_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid uuid `{uuid_raw}` ({error})")))?;

    Ok(Document {
        id: DocumentId(row.try_get("id")?),
        uuid,
        verification_code: VerificationCode(row.try_get("verification_code")?),
        document_type_id: DocumentTypeId(row.try_get("document_type_id")?),
        title: row.try_get("title")?,
        owner: UserId(row.try_get("owner_user_id")?),
        context: DocumentContext {
            subject_id: row.try_get("subject_id")?,
            group_id: row.try_get("group_id")?,
            academic_term_id: row.try_get("academic_term_id")?,
        },
        status,
        current_step: parse_u32("current_step", row.try_get("current_step")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        completed_at: parse_optional_timestamp("completed_at", row.try_get("completed_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

pub(crate) fn step_from_row(row: SqliteRow) -> Result<ApprovalStep, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = StepStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown step status `{status_raw}`")))?;

    Ok(ApprovalStep {
        id: ApprovalStepId(row.try_get("id")?),
        document_id: DocumentId(row.try_get("document_id")?),
        step_order: parse_u32("step_order", row.try_get("step_order")?)?,
        role_required: RoleTag::parse(&row.try_get::<String, _>("role_required")?),
        approver: row.try_get::<Option<String>, _>("approver_user_id")?.map(UserId),
        status,
        deadline: parse_timestamp("deadline", row.try_get("deadline")?)?,
        approved_at: parse_optional_timestamp("approved_at", row.try_get("approved_at")?)?,
        comment: row.try_get("comment")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use uuid::Uuid;

    use docflow_core::domain::approval::{ClientMetadata, StepStatus};
    use docflow_core::domain::directory::UserId;
    use docflow_core::domain::document::{
        Document, DocumentContext, DocumentId, DocumentStatus, VerificationCode,
    };
    use docflow_core::domain::document_type::{DocumentType, DocumentTypeId};
    use docflow_core::domain::role::RoleTag;
    use docflow_core::workflow::DocumentWorkflow;

    use super::SqlWorkflowRepository;
    use crate::repositories::{DocumentTypeRepository, RepositoryError, SqlDocumentTypeRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 9, 30, 0).single().expect("valid timestamp")
    }

    fn memo_type() -> DocumentType {
        DocumentType {
            id: DocumentTypeId("memo".to_string()),
            name: "Memo".to_string(),
            workflow: vec![RoleTag::DepartmentHead, RoleTag::FacultyDean],
            deadline_hours: Some(48),
            is_active: true,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn document(id: &str) -> Document {
        Document {
            id: DocumentId(id.to_string()),
            uuid: Uuid::new_v4(),
            verification_code: VerificationCode(format!("C{}", &id[id.len() - 3..])),
            document_type_id: DocumentTypeId("memo".to_string()),
            title: "Lab schedule".to_string(),
            owner: UserId("uploader".to_string()),
            context: DocumentContext::default(),
            status: DocumentStatus::Uploaded,
            current_step: 0,
            created_at: now(),
            completed_at: None,
            updated_at: now(),
        }
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlDocumentTypeRepository::new(pool.clone()).save(memo_type()).await.expect("type");
        pool
    }

    async fn create(repo: &SqlWorkflowRepository, id: &str) -> DocumentWorkflow {
        let (workflow, _) = DocumentWorkflow::create(
            document(id),
            &memo_type(),
            vec![Some(UserId("head".to_string())), Some(UserId("dean".to_string()))],
            48,
            now(),
        )
        .expect("create workflow");

        let mut tx = repo.begin().await.expect("begin");
        repo.insert(&mut tx, &workflow).await.expect("insert");
        tx.commit().await.expect("commit");
        workflow
    }

    #[tokio::test]
    async fn insert_then_load_round_trips_the_aggregate() {
        let pool = setup_pool().await;
        let repo = SqlWorkflowRepository::new(pool);
        let created = create(&repo, "doc-001").await;

        let mut tx = repo.begin().await.expect("begin");
        let loaded = repo
            .load(&mut tx, &created.document.id)
            .await
            .expect("load")
            .expect("document exists");
        tx.rollback().await.expect("rollback");

        assert_eq!(loaded.document, created.document);
        assert_eq!(loaded.steps, created.steps);
        assert_eq!(loaded.document.status, DocumentStatus::PendingApproval);
    }

    #[tokio::test]
    async fn save_persists_transition_and_log() {
        let pool = setup_pool().await;
        let repo = SqlWorkflowRepository::new(pool.clone());
        let created = create(&repo, "doc-002").await;

        let mut tx = repo.begin().await.expect("begin");
        let mut workflow =
            repo.load(&mut tx, &created.document.id).await.expect("load").expect("exists");
        let transition = workflow
            .approve(
                &UserId("head".to_string()),
                Some("ok".to_string()),
                ClientMetadata::default(),
                now() + Duration::hours(1),
            )
            .expect("approve");
        repo.save(&mut tx, &workflow).await.expect("save");
        repo.append_log(&mut tx, &transition.log).await.expect("log");
        tx.commit().await.expect("commit");

        let mut tx = repo.begin().await.expect("begin");
        let reloaded =
            repo.load(&mut tx, &created.document.id).await.expect("load").expect("exists");
        tx.rollback().await.expect("rollback");

        assert_eq!(reloaded.document.current_step, 1);
        assert_eq!(reloaded.steps[0].status, StepStatus::Approved);
        assert_eq!(reloaded.steps[0].comment.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn save_refuses_to_overwrite_a_terminal_step() {
        let pool = setup_pool().await;
        let repo = SqlWorkflowRepository::new(pool.clone());
        let created = create(&repo, "doc-003").await;

        let mut stale = created.clone();
        stale
            .approve(&UserId("head".to_string()), None, ClientMetadata::default(), now())
            .expect("approve stale copy");

        sqlx::query("UPDATE approval_step SET status = 'rejected' WHERE id = ?")
            .bind(&created.steps[0].id.0)
            .execute(&pool)
            .await
            .expect("simulate concurrent rejection");

        let mut tx = repo.begin().await.expect("begin");
        let error = repo.save(&mut tx, &stale).await.expect_err("stale write must fail");
        tx.rollback().await.expect("rollback");

        assert!(matches!(
            error,
            RepositoryError::Conflict { step_order: 0, status: StepStatus::Rejected, .. }
        ));
    }

    #[tokio::test]
    async fn approval_log_is_append_only() {
        let pool = setup_pool().await;
        let repo = SqlWorkflowRepository::new(pool.clone());
        let created = create(&repo, "doc-004").await;

        let mut tx = repo.begin().await.expect("begin");
        let mut workflow =
            repo.load(&mut tx, &created.document.id).await.expect("load").expect("exists");
        let transition = workflow
            .approve(&UserId("head".to_string()), None, ClientMetadata::default(), now())
            .expect("approve");
        repo.save(&mut tx, &workflow).await.expect("save");
        repo.append_log(&mut tx, &transition.log).await.expect("log");
        tx.commit().await.expect("commit");

        let update = sqlx::query("UPDATE approval_log SET comment = 'tampered'")
            .execute(&pool)
            .await;
        assert!(update.is_err(), "log rows must not be updated");

        let delete = sqlx::query("DELETE FROM approval_log").execute(&pool).await;
        assert!(delete.is_err(), "log rows must not be deleted");
    }

    #[tokio::test]
    async fn verification_codes_are_checked_for_collisions() {
        let pool = setup_pool().await;
        let repo = SqlWorkflowRepository::new(pool);
        let created = create(&repo, "doc-005").await;

        let mut tx = repo.begin().await.expect("begin");
        let taken = repo
            .verification_code_taken(&mut tx, &created.document.verification_code)
            .await
            .expect("check");
        let free = repo
            .verification_code_taken(&mut tx, &VerificationCode("ZZZZ".to_string()))
            .await
            .expect("check");
        tx.rollback().await.expect("rollback");

        assert!(taken);
        assert!(!free);
    }
}
