//! Periodic sweep loops.
//!
//! One loop per task. Ticks that fall behind are skipped rather than
//! replayed, so a slow sweep never causes a burst of back-to-back runs.

use std::sync::Arc;
use std::time::Duration;

use docflow_core::config::SchedulerConfig;
use docflow_engine::{JobTask, JobTracker, WorkflowEngine};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

pub fn spawn(
    engine: Arc<WorkflowEngine>,
    tracker: JobTracker,
    config: &SchedulerConfig,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    [
        (JobTask::AutoApprove, config.auto_approve_interval_secs),
        (JobTask::DeadlineCheck, config.deadline_check_interval_secs),
        (JobTask::SkipUnassigned, config.skip_unassigned_interval_secs),
    ]
    .into_iter()
    .map(|(task, secs)| {
        tokio::spawn(run_loop(
            Arc::clone(&engine),
            tracker.clone(),
            task,
            Duration::from_secs(secs),
            shutdown.clone(),
        ))
    })
    .collect()
}

pub async fn run_loop(
    engine: Arc<WorkflowEngine>,
    tracker: JobTracker,
    task: JobTask,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(
        event_name = "scheduler.loop.started",
        task = task.as_str(),
        period_secs = period.as_secs(),
        "scheduler loop started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Failures are already logged and recorded by the tracker.
                if let Ok(report) = tracker.track(task, engine.run_task(task)).await {
                    debug!(
                        event_name = "scheduler.tick.completed",
                        task = task.as_str(),
                        report = ?report,
                        "scheduled sweep completed"
                    );
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!(event_name = "scheduler.loop.stopped", task = task.as_str(), "scheduler loop stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use docflow_core::clock::SystemClock;
    use docflow_db::repositories::{JobRunRepository, JobRunStatus, SqlJobRunRepository};
    use docflow_db::{connect_with_settings, migrations};
    use docflow_engine::{JobTask, JobTracker, WorkflowEngine};
    use tokio::sync::watch;

    use super::run_loop;

    #[tokio::test]
    async fn loop_records_runs_and_stops_on_shutdown() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let runs = Arc::new(SqlJobRunRepository::new(pool.clone()));
        let tracker = JobTracker::new(runs.clone(), Arc::new(SystemClock));
        let engine = Arc::new(WorkflowEngine::builder(pool.clone()).build());
        let (stop, shutdown) = watch::channel(false);

        let handle = tokio::spawn(run_loop(
            engine,
            tracker,
            JobTask::SkipUnassigned,
            Duration::from_millis(20),
            shutdown,
        ));

        let mut recorded = Vec::new();
        for _ in 0..100 {
            recorded = runs.list().await.expect("list job runs");
            if recorded.iter().any(|run| run.last_status == JobRunStatus::Success) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].task_name, "skip_unassigned");
        assert_eq!(recorded[0].last_status, JobRunStatus::Success);

        stop.send_replace(true);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop stops after shutdown")
            .expect("loop task does not panic");
    }
}
