use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{
    format_timestamp, parse_optional_timestamp, parse_timestamp, JobRunRepository, RepositoryError,
};
use crate::DbPool;

const MAX_ERROR_CHARS: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRunStatus {
    Running,
    Success,
    Failed,
}

impl JobRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Last known outcome of one periodic task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobRun {
    pub task_name: String,
    pub last_status: JobRunStatus,
    pub last_run_at: DateTime<Utc>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_error: Option<String>,
}

#[derive(Clone)]
pub struct SqlJobRunRepository {
    pool: DbPool,
}

impl SqlJobRunRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl JobRunRepository for SqlJobRunRepository {
    async fn mark_started(
        &self,
        task_name: &str,
        started_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO job_run (task_name, last_status, last_run_at)
             VALUES (?, 'running', ?)
             ON CONFLICT(task_name) DO UPDATE SET
                 last_status = 'running',
                 last_run_at = excluded.last_run_at",
        )
        .bind(task_name)
        .bind(format_timestamp(started_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_finished(
        &self,
        task_name: &str,
        finished_at: DateTime<Utc>,
        duration_ms: u64,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let status = if error.is_some() { JobRunStatus::Failed } else { JobRunStatus::Success };
        let error: Option<String> = error.map(|message| message.chars().take(MAX_ERROR_CHARS).collect());
        let success_at = error.is_none().then(|| format_timestamp(finished_at));

        sqlx::query(
            "INSERT INTO job_run (task_name, last_status, last_run_at, last_success_at,
                                  last_duration_ms, last_error)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(task_name) DO UPDATE SET
                 last_status = excluded.last_status,
                 last_success_at = COALESCE(excluded.last_success_at, job_run.last_success_at),
                 last_duration_ms = excluded.last_duration_ms,
                 last_error = excluded.last_error",
        )
        .bind(task_name)
        .bind(status.as_str())
        .bind(format_timestamp(finished_at))
        .bind(success_at)
        .bind(i64::try_from(duration_ms).unwrap_or(i64::MAX))
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<JobRun>, RepositoryError> {
        sqlx::query(
            "SELECT task_name, last_status, last_run_at, last_success_at, last_duration_ms,
                    last_error
             FROM job_run ORDER BY task_name ASC",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(job_run_from_row)
        .collect()
    }
}

fn job_run_from_row(row: SqliteRow) -> Result<JobRun, RepositoryError> {
    let status_raw = row.try_get::<String, _>("last_status")?;
    let last_status = JobRunStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown job status `{status_raw}`")))?;

    Ok(JobRun {
        task_name: row.try_get("task_name")?,
        last_status,
        last_run_at: parse_timestamp("last_run_at", row.try_get("last_run_at")?)?,
        last_success_at: parse_optional_timestamp(
            "last_success_at",
            row.try_get("last_success_at")?,
        )?,
        last_duration_ms: row
            .try_get::<Option<i64>, _>("last_duration_ms")?
            .map(|value| u64::try_from(value).unwrap_or_default()),
        last_error: row.try_get("last_error")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{JobRunStatus, SqlJobRunRepository};
    use crate::repositories::JobRunRepository;
    use crate::{connect_with_settings, migrations};

    async fn repo() -> SqlJobRunRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlJobRunRepository::new(pool)
    }

    #[tokio::test]
    async fn failed_run_keeps_previous_success_timestamp() {
        let repo = repo().await;
        let start = Utc.with_ymd_and_hms(2026, 3, 3, 0, 0, 0).single().expect("valid timestamp");

        repo.mark_started("auto_approve", start).await.expect("start");
        repo.mark_finished("auto_approve", start, 12, None).await.expect("finish");

        let later = start + Duration::hours(1);
        repo.mark_started("auto_approve", later).await.expect("start again");
        let running = repo.list().await.expect("list");
        assert_eq!(running[0].last_status, JobRunStatus::Running);

        repo.mark_finished("auto_approve", later, 40, Some("database is locked"))
            .await
            .expect("finish with error");

        let runs = repo.list().await.expect("list");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].last_status, JobRunStatus::Failed);
        assert_eq!(runs[0].last_success_at, Some(start));
        assert_eq!(runs[0].last_run_at, later);
        assert_eq!(runs[0].last_duration_ms, Some(40));
        assert_eq!(runs[0].last_error.as_deref(), Some("database is locked"));
    }

    #[tokio::test]
    async fn long_errors_are_truncated() {
        let repo = repo().await;
        let at = Utc.with_ymd_and_hms(2026, 3, 3, 0, 0, 0).single().expect("valid timestamp");
        let message = "x".repeat(5000);

        repo.mark_finished("deadline_check", at, 1, Some(&message)).await.expect("finish");

        let runs = repo.list().await.expect("list");
        assert_eq!(runs[0].last_error.as_ref().map(String::len), Some(1000));
    }
}
