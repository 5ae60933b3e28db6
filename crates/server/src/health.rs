use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use docflow_db::repositories::{JobRunRepository, JobRunStatus, SqlJobRunRepository};
use docflow_db::DbPool;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    job_runs: SqlJobRunRepository,
}

impl HealthState {
    pub fn new(db_pool: DbPool) -> Self {
        let job_runs = SqlJobRunRepository::new(db_pool.clone());
        Self { db_pool, job_runs }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub task_name: String,
    pub last_status: JobRunStatus,
    pub last_run_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub jobs: Vec<JobStatus>,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState::new(db_pool))
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    db_pool: DbPool,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        let stopped = async move {
            shutdown.changed().await.ok();
        };
        if let Err(error) =
            axum::serve(listener, router(db_pool)).with_graceful_shutdown(stopped).await
        {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";
    let jobs = if ready { job_statuses(&state.job_runs).await } else { Vec::new() };

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "docflow-server runtime initialized".to_string(),
        },
        database,
        jobs,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn job_statuses(job_runs: &SqlJobRunRepository) -> Vec<JobStatus> {
    match job_runs.list().await {
        Ok(runs) => runs
            .into_iter()
            .map(|run| JobStatus {
                task_name: run.task_name,
                last_status: run.last_status,
                last_run_at: run.last_run_at,
            })
            .collect(),
        Err(error) => {
            warn!(
                event_name = "system.health.jobs_unavailable",
                error = %error,
                "could not list job runs"
            );
            Vec::new()
        }
    }
}
