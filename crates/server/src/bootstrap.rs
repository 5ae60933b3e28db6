use std::sync::Arc;

use docflow_core::clock::SystemClock;
use docflow_core::config::{AppConfig, ConfigError, LoadOptions};
use docflow_db::repositories::SqlJobRunRepository;
use docflow_db::{connect_with_settings, migrations, DbPool};
use docflow_engine::{JobTracker, WorkflowEngine};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Arc<WorkflowEngine>,
    pub tracker: JobTracker,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

#[cfg(test)]
pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        database_url = %config.database.url,
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let engine = Arc::new(WorkflowEngine::builder(db_pool.clone()).config(&config).build());
    let tracker = JobTracker::new(
        Arc::new(SqlJobRunRepository::new(db_pool.clone())),
        Arc::new(SystemClock),
    );

    Ok(Application { config, db_pool, engine, tracker })
}

#[cfg(test)]
mod tests {
    use docflow_core::config::{ConfigOverrides, LoadOptions};
    use docflow_db::DemoSeedDataset;
    use docflow_engine::JobTask;

    use crate::bootstrap::bootstrap;

    fn overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_rejects_unsupported_database_urls() {
        let result = bootstrap(overrides("postgres://localhost/docflow")).await;

        let message = result.err().expect("bootstrap should fail").to_string();
        assert!(message.contains("database.url"), "{message}");
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_wires_the_engine() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("server.db").display());
        let app = bootstrap(overrides(&url)).await.expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table'
               AND name IN ('document', 'approval_step', 'approval_log', 'job_run')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("count workflow tables");
        assert_eq!(table_count, 4);

        DemoSeedDataset::load(&app.db_pool).await.expect("seed");
        let report = app
            .tracker
            .track(JobTask::AutoApprove, app.engine.run_task(JobTask::AutoApprove))
            .await
            .expect("sweep runs against a fresh database");
        assert!(matches!(report, docflow_engine::SweepReport::AutoApprove(_)));

        app.db_pool.close().await;
    }
}
