use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use docflow_core::domain::document_type::{DocumentType, DocumentTypeId};
use docflow_core::domain::role::RoleTag;

use super::{format_timestamp, parse_timestamp, parse_u32, DocumentTypeRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDocumentTypeRepository {
    pool: DbPool,
}

impl SqlDocumentTypeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DocumentTypeRepository for SqlDocumentTypeRepository {
    async fn find_by_id(
        &self,
        id: &DocumentTypeId,
    ) -> Result<Option<DocumentType>, RepositoryError> {
        sqlx::query(
            "SELECT id, name, workflow_json, deadline_hours, is_active, created_at, updated_at
             FROM document_type WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?
        .map(document_type_from_row)
        .transpose()
    }

    async fn save(&self, document_type: DocumentType) -> Result<(), RepositoryError> {
        let workflow: Vec<&str> = document_type.workflow.iter().map(RoleTag::as_str).collect();
        let workflow_json = serde_json::to_string(&workflow)
            .map_err(|error| RepositoryError::Decode(format!("workflow encode: {error}")))?;

        sqlx::query(
            "INSERT INTO document_type (id, name, workflow_json, deadline_hours, is_active,
                                        created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 workflow_json = excluded.workflow_json,
                 deadline_hours = excluded.deadline_hours,
                 is_active = excluded.is_active,
                 updated_at = excluded.updated_at",
        )
        .bind(&document_type.id.0)
        .bind(&document_type.name)
        .bind(workflow_json)
        .bind(document_type.deadline_hours.map(i64::from))
        .bind(document_type.is_active)
        .bind(format_timestamp(document_type.created_at))
        .bind(format_timestamp(document_type.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<DocumentType>, RepositoryError> {
        sqlx::query(
            "SELECT id, name, workflow_json, deadline_hours, is_active, created_at, updated_at
             FROM document_type WHERE is_active = 1 ORDER BY name ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(document_type_from_row)
        .collect()
    }
}

/// The role sequence is parsed once here; unknown tags survive as
/// unrecognised roles and resolve to nobody.
fn document_type_from_row(row: SqliteRow) -> Result<DocumentType, RepositoryError> {
    let workflow_json = row.try_get::<String, _>("workflow_json")?;
    let tags: Vec<String> = serde_json::from_str(&workflow_json).map_err(|error| {
        RepositoryError::Decode(format!("invalid workflow_json `{workflow_json}` ({error})"))
    })?;

    Ok(DocumentType {
        id: DocumentTypeId(row.try_get("id")?),
        name: row.try_get("name")?,
        workflow: tags.iter().map(|tag| RoleTag::parse(tag)).collect(),
        deadline_hours: row
            .try_get::<Option<i64>, _>("deadline_hours")?
            .map(|hours| parse_u32("deadline_hours", hours))
            .transpose()?,
        is_active: row.try_get("is_active")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use docflow_core::domain::document_type::{DocumentType, DocumentTypeId};
    use docflow_core::domain::role::RoleTag;

    use super::SqlDocumentTypeRepository;
    use crate::repositories::DocumentTypeRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn document_type(id: &str, workflow: Vec<RoleTag>, is_active: bool) -> DocumentType {
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).single().expect("valid timestamp");
        DocumentType {
            id: DocumentTypeId(id.to_string()),
            name: id.to_uppercase(),
            workflow,
            deadline_hours: Some(72),
            is_active,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn save_and_find_round_trips_the_role_sequence() {
        let repo = SqlDocumentTypeRepository::new(setup_pool().await);
        let saved = document_type(
            "syllabus",
            vec![RoleTag::Teacher, RoleTag::DepartmentHead, RoleTag::parse("night_watch")],
            true,
        );

        repo.save(saved.clone()).await.expect("save");
        let found = repo
            .find_by_id(&DocumentTypeId("syllabus".to_string()))
            .await
            .expect("find")
            .expect("exists");

        assert_eq!(found, saved);
        assert!(!found.workflow[2].is_recognized());
    }

    #[tokio::test]
    async fn list_active_hides_retired_types() {
        let repo = SqlDocumentTypeRepository::new(setup_pool().await);
        repo.save(document_type("memo", vec![RoleTag::FacultyDean], true)).await.expect("save");
        repo.save(document_type("legacy", vec![RoleTag::Director], false)).await.expect("save");

        let active = repo.list_active().await.expect("list");

        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, DocumentTypeId("memo".to_string()));
    }

    #[tokio::test]
    async fn malformed_workflow_json_is_a_decode_error() {
        let pool = setup_pool().await;
        sqlx::query(
            "INSERT INTO document_type (id, name, workflow_json, is_active, created_at, updated_at)
             VALUES ('broken', 'Broken', 'not-json', 1, '2026-01-01T00:00:00.000000Z',
                     '2026-01-01T00:00:00.000000Z')",
        )
        .execute(&pool)
        .await
        .expect("insert raw row");

        let repo = SqlDocumentTypeRepository::new(pool);
        let error = repo
            .find_by_id(&DocumentTypeId("broken".to_string()))
            .await
            .expect_err("decode must fail");
        assert!(error.to_string().contains("invalid workflow_json"));
    }
}
