use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use docflow_core::domain::directory::{DirectoryUser, OrgScope, UserId};
use docflow_core::domain::role::RoleTag;
use docflow_core::workflow::{Directory, DirectoryError};

use super::RepositoryError;
use crate::DbPool;

/// Organisation directory backed by the `org_*` tables.
#[derive(Clone)]
pub struct SqlDirectory {
    pool: DbPool,
}

impl SqlDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn single_user_id(
        &self,
        sql: &str,
        binds: &[&str],
    ) -> Result<Option<UserId>, DirectoryError> {
        let mut query = sqlx::query(sql);
        for value in binds {
            query = query.bind(*value);
        }
        let row = query.fetch_optional(&self.pool).await.map_err(unavailable)?;
        row.map(|row| row.try_get::<Option<String>, _>(0))
            .transpose()
            .map(|value| value.flatten().map(UserId))
            .map_err(unavailable)
    }
}

fn unavailable(error: sqlx::Error) -> DirectoryError {
    DirectoryError::Unavailable(error.to_string())
}

#[async_trait]
impl Directory for SqlDirectory {
    async fn find_user(&self, id: &UserId) -> Result<Option<DirectoryUser>, DirectoryError> {
        sqlx::query(
            "SELECT id, display_name, email, faculty_id, department_id, active_role, is_active
             FROM org_user WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?
        .map(user_from_row)
        .transpose()
        .map_err(|error| DirectoryError::Unavailable(error.to_string()))
    }

    async fn department_head(
        &self,
        department_id: &str,
    ) -> Result<Option<UserId>, DirectoryError> {
        self.single_user_id("SELECT head_user_id FROM org_department WHERE id = ?", &[department_id])
            .await
    }

    async fn faculty_dean(&self, faculty_id: &str) -> Result<Option<UserId>, DirectoryError> {
        self.single_user_id("SELECT dean_user_id FROM org_faculty WHERE id = ?", &[faculty_id]).await
    }

    async fn first_active_with_role(
        &self,
        role: &RoleTag,
        scope: &OrgScope,
    ) -> Result<Option<UserId>, DirectoryError> {
        match scope {
            OrgScope::Unscoped => {
                self.single_user_id(
                    "SELECT id FROM org_user
                     WHERE is_active = 1 AND active_role = ?
                     ORDER BY id ASC LIMIT 1",
                    &[role.as_str()],
                )
                .await
            }
            OrgScope::Faculty(faculty_id) => {
                self.single_user_id(
                    "SELECT id FROM org_user
                     WHERE is_active = 1 AND active_role = ? AND faculty_id = ?
                     ORDER BY id ASC LIMIT 1",
                    &[role.as_str(), faculty_id.as_str()],
                )
                .await
            }
            OrgScope::Department(department_id) => {
                self.single_user_id(
                    "SELECT id FROM org_user
                     WHERE is_active = 1 AND active_role = ? AND department_id = ?
                     ORDER BY id ASC LIMIT 1",
                    &[role.as_str(), department_id.as_str()],
                )
                .await
            }
        }
    }

    async fn allocated_teacher(
        &self,
        subject_id: &str,
        group_id: &str,
        academic_term_id: &str,
    ) -> Result<Option<UserId>, DirectoryError> {
        self.single_user_id(
            "SELECT teacher_user_id FROM teaching_allocation
             WHERE subject_id = ? AND group_id = ? AND academic_term_id = ?",
            &[subject_id, group_id, academic_term_id],
        )
        .await
    }
}

fn user_from_row(row: SqliteRow) -> Result<DirectoryUser, RepositoryError> {
    Ok(DirectoryUser {
        id: UserId(row.try_get("id")?),
        display_name: row.try_get("display_name")?,
        email: row.try_get("email")?,
        faculty_id: row.try_get("faculty_id")?,
        department_id: row.try_get("department_id")?,
        active_role: row.try_get::<Option<String>, _>("active_role")?.map(|role| RoleTag::parse(&role)),
        is_active: row.try_get("is_active")?,
    })
}
