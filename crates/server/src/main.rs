mod bootstrap;
mod health;
mod scheduler;

use std::time::Duration;

use anyhow::Result;
use docflow_core::config::{AppConfig, LoadOptions, LogFormat};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    let installed = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(error) = installed {
        eprintln!("logging already initialised: {error}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Config first so logging honours the configured level and format.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
        shutdown_rx.clone(),
    )
    .await?;

    let workers = if app.config.scheduler.enabled {
        scheduler::spawn(app.engine.clone(), app.tracker.clone(), &app.config.scheduler, shutdown_rx)
    } else {
        info!(
            event_name = "system.server.scheduler_disabled",
            correlation_id = "bootstrap",
            "scheduler disabled by configuration"
        );
        Vec::new()
    };

    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        scheduled_tasks = workers.len(),
        "docflow-server started"
    );
    tokio::signal::ctrl_c().await?;
    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "docflow-server stopping"
    );

    shutdown_tx.send_replace(true);
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let drained = tokio::time::timeout(grace, async {
        for worker in workers {
            if let Err(error) = worker.await {
                warn!(
                    event_name = "system.server.worker_failed",
                    correlation_id = "shutdown",
                    error = %error,
                    "scheduler loop ended abnormally"
                );
            }
        }
    })
    .await;
    if drained.is_err() {
        warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "scheduler loops still running at shutdown deadline"
        );
    }

    app.db_pool.close().await;
    Ok(())
}
