use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use docflow_core::domain::approval::StepStatus;
use docflow_core::domain::document_type::{DocumentType, DocumentTypeId};
use docflow_core::errors::WorkflowError;

pub mod directory;
pub mod document_type;
pub mod job_run;
pub mod queries;
pub mod reminder;
pub mod workflow;

pub use directory::SqlDirectory;
pub use document_type::SqlDocumentTypeRepository;
pub use job_run::{JobRun, JobRunStatus, SqlJobRunRepository};
pub use queries::{DocumentHistory, OverdueStep, PendingApproval, SqlWorkflowQueries};
pub use reminder::SqlReminderLedger;
pub use workflow::SqlWorkflowRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("step {step_order} of document {document_id} changed concurrently (now {status})")]
    Conflict { document_id: String, step_order: u32, status: StepStatus },
}

impl From<RepositoryError> for WorkflowError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Conflict { step_order, status, .. } => {
                WorkflowError::Conflict { step_order, status }
            }
            other => WorkflowError::Storage(other.to_string()),
        }
    }
}

#[async_trait]
pub trait DocumentTypeRepository: Send + Sync {
    async fn find_by_id(&self, id: &DocumentTypeId)
        -> Result<Option<DocumentType>, RepositoryError>;
    async fn save(&self, document_type: DocumentType) -> Result<(), RepositoryError>;
    async fn list_active(&self) -> Result<Vec<DocumentType>, RepositoryError>;
}

#[async_trait]
pub trait JobRunRepository: Send + Sync {
    async fn mark_started(
        &self,
        task_name: &str,
        started_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    async fn mark_finished(
        &self,
        task_name: &str,
        finished_at: DateTime<Utc>,
        duration_ms: u64,
        error: Option<&str>,
    ) -> Result<(), RepositoryError>;
    async fn list(&self) -> Result<Vec<JobRun>, RepositoryError>;
}

/// Fixed-width UTC text so timestamps compare correctly as strings in SQL.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|value| parse_timestamp(column, value)).transpose()
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("`{column}` out of range: {value}")))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use docflow_core::domain::approval::StepStatus;
    use docflow_core::errors::WorkflowError;

    use super::{format_timestamp, parse_timestamp, RepositoryError};

    #[test]
    fn timestamps_are_fixed_width_and_sortable() {
        let whole = Utc.with_ymd_and_hms(2026, 1, 9, 8, 0, 0).single().expect("valid");
        let later = whole + chrono::Duration::microseconds(1500);

        let whole_text = format_timestamp(whole);
        let later_text = format_timestamp(later);

        assert_eq!(whole_text, "2026-01-09T08:00:00.000000Z");
        assert_eq!(whole_text.len(), later_text.len());
        assert!(whole_text < later_text);
        assert_eq!(parse_timestamp("at", later_text).expect("parse"), later);
    }

    #[test]
    fn conflicts_surface_as_workflow_conflicts() {
        let error = RepositoryError::Conflict {
            document_id: "doc-1".to_string(),
            step_order: 2,
            status: StepStatus::Approved,
        };
        assert_eq!(
            WorkflowError::from(error),
            WorkflowError::Conflict { step_order: 2, status: StepStatus::Approved }
        );

        let decode = WorkflowError::from(RepositoryError::Decode("bad row".to_string()));
        assert!(matches!(decode, WorkflowError::Storage(message) if message.contains("bad row")));
    }
}
