//! Job-run bookkeeping for scheduled sweeps.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use docflow_core::clock::Clock;
use docflow_core::errors::WorkflowError;
use docflow_db::repositories::JobRunRepository;

use crate::reminders::ReminderReport;
use crate::service::WorkflowEngine;
use crate::sweeps::{AutoApproveReport, SkipSweepReport};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobTask {
    AutoApprove,
    DeadlineCheck,
    SkipUnassigned,
}

impl JobTask {
    pub const ALL: [JobTask; 3] = [Self::AutoApprove, Self::DeadlineCheck, Self::SkipUnassigned];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoApprove => "auto_approve",
            Self::DeadlineCheck => "deadline_check",
            Self::SkipUnassigned => "skip_unassigned",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum SweepReport {
    AutoApprove(AutoApproveReport),
    DeadlineCheck(ReminderReport),
    SkipUnassigned(SkipSweepReport),
}

impl WorkflowEngine {
    pub async fn run_task(&self, task: JobTask) -> Result<SweepReport, WorkflowError> {
        match task {
            JobTask::AutoApprove => self.run_auto_approve_sweep().await.map(SweepReport::AutoApprove),
            JobTask::DeadlineCheck => {
                self.run_deadline_reminder_sweep().await.map(SweepReport::DeadlineCheck)
            }
            JobTask::SkipUnassigned => {
                self.run_skip_unassigned_sweep().await.map(SweepReport::SkipUnassigned)
            }
        }
    }
}

/// Wraps a sweep run with `job_run` bookkeeping.
///
/// Failing to write the bookkeeping row is logged and never changes the
/// outcome of the sweep itself.
#[derive(Clone)]
pub struct JobTracker {
    runs: Arc<dyn JobRunRepository>,
    clock: Arc<dyn Clock>,
}

impl JobTracker {
    pub fn new(runs: Arc<dyn JobRunRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { runs, clock }
    }

    pub async fn track<T, F>(&self, task: JobTask, run: F) -> Result<T, WorkflowError>
    where
        F: Future<Output = Result<T, WorkflowError>>,
    {
        let run_id = Uuid::new_v4().to_string();
        let started_at = self.clock.now();
        if let Err(error) = self.runs.mark_started(task.as_str(), started_at).await {
            warn!(
                event_name = "job.run.record_failed",
                correlation_id = %run_id,
                task = task.as_str(),
                error = %error,
                "could not record job start"
            );
        }

        let timer = Instant::now();
        let result = run.await;
        let duration_ms = u64::try_from(timer.elapsed().as_millis()).unwrap_or(u64::MAX);
        let failure = result.as_ref().err().map(ToString::to_string);

        if let Err(error) = self
            .runs
            .mark_finished(task.as_str(), self.clock.now(), duration_ms, failure.as_deref())
            .await
        {
            warn!(
                event_name = "job.run.record_failed",
                correlation_id = %run_id,
                task = task.as_str(),
                error = %error,
                "could not record job outcome"
            );
        }

        match &failure {
            None => info!(
                event_name = "job.run.succeeded",
                correlation_id = %run_id,
                task = task.as_str(),
                duration_ms,
                "job run succeeded"
            ),
            Some(message) => error!(
                event_name = "job.run.failed",
                correlation_id = %run_id,
                task = task.as_str(),
                duration_ms,
                error = %message,
                "job run failed"
            ),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use docflow_core::clock::FixedClock;
    use docflow_core::errors::WorkflowError;
    use docflow_db::repositories::{JobRunRepository, JobRunStatus, SqlJobRunRepository};
    use docflow_db::{connect_with_settings, migrations};

    use super::{JobTask, JobTracker};

    #[test]
    fn task_names_match_job_run_rows() {
        let names: Vec<_> = JobTask::ALL.iter().map(JobTask::as_str).collect();
        assert_eq!(names, ["auto_approve", "deadline_check", "skip_unassigned"]);
    }

    #[tokio::test]
    async fn tracker_records_success_and_failure() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let runs = Arc::new(SqlJobRunRepository::new(pool));
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 3, 0, 0).single().expect("valid timestamp");
        let tracker = JobTracker::new(runs.clone(), Arc::new(FixedClock::new(at)));

        let value = tracker.track(JobTask::AutoApprove, async { Ok(7) }).await.expect("success");
        assert_eq!(value, 7);

        let failed = tracker
            .track(JobTask::DeadlineCheck, async {
                Err::<(), _>(WorkflowError::Storage("pool closed".to_string()))
            })
            .await;
        assert!(failed.is_err());

        let recorded = runs.list().await.expect("list job runs");
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].task_name, "auto_approve");
        assert_eq!(recorded[0].last_status, JobRunStatus::Success);
        assert_eq!(recorded[1].task_name, "deadline_check");
        assert_eq!(recorded[1].last_status, JobRunStatus::Failed);
        assert!(recorded[1].last_error.as_deref().is_some_and(|error| error.contains("pool closed")));
    }
}
