use std::sync::Arc;

use crate::commands::{open_pool, prepare, CommandResult, Failure, EXIT_MIGRATION, EXIT_SWEEP};
use crate::SweepMode;
use docflow_core::clock::SystemClock;
use docflow_db::migrations;
use docflow_db::repositories::SqlJobRunRepository;
use docflow_engine::{JobTask, JobTracker, SweepReport, WorkflowEngine};

pub fn tasks_for(mode: SweepMode) -> Vec<JobTask> {
    match mode {
        SweepMode::AutoApprove => vec![JobTask::AutoApprove],
        SweepMode::DeadlineCheck => vec![JobTask::DeadlineCheck],
        SweepMode::SkipUnassigned => vec![JobTask::SkipUnassigned],
        // Skipping first keeps vacated steps out of the auto-approve candidates.
        SweepMode::All => vec![JobTask::SkipUnassigned, JobTask::AutoApprove, JobTask::DeadlineCheck],
    }
}

pub fn run(mode: SweepMode) -> CommandResult {
    let (config, runtime) = match prepare() {
        Ok(prepared) => prepared,
        Err(failure) => return CommandResult::from_failure("sweep", failure),
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

        let engine = WorkflowEngine::builder(pool.clone()).config(&config).build();
        let tracker =
            JobTracker::new(Arc::new(SqlJobRunRepository::new(pool.clone())), Arc::new(SystemClock));

        let mut reports: Vec<SweepReport> = Vec::new();
        for task in tasks_for(mode) {
            let report = tracker.track(task, engine.run_task(task)).await.map_err(|error| {
                ("sweep_failed", format!("{} sweep failed: {error}", task.as_str()), EXIT_SWEEP)
            })?;
            reports.push(report);
        }

        pool.close().await;
        Ok::<_, Failure>(reports)
    });

    match result {
        Ok(reports) => CommandResult::success_with_details(
            "sweep",
            format!("completed {} sweep(s)", reports.len()),
            serde_json::to_value(&reports).ok(),
        ),
        Err(failure) => CommandResult::from_failure("sweep", failure),
    }
}

#[cfg(test)]
mod tests {
    use super::tasks_for;
    use crate::SweepMode;
    use docflow_engine::JobTask;

    #[test]
    fn all_mode_skips_before_auto_approving() {
        assert_eq!(
            tasks_for(SweepMode::All),
            [JobTask::SkipUnassigned, JobTask::AutoApprove, JobTask::DeadlineCheck]
        );
        assert_eq!(tasks_for(SweepMode::DeadlineCheck), [JobTask::DeadlineCheck]);
    }
}
