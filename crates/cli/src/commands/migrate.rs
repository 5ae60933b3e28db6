use crate::commands::{open_pool, prepare, CommandResult, Failure, EXIT_MIGRATION};
use docflow_db::migrations;

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare() {
        Ok(prepared) => prepared,
        Err(failure) => return CommandResult::from_failure("migrate", failure),
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let before = migrations::applied_count(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
        let after = migrations::applied_count(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
        pool.close().await;
        Ok::<_, Failure>(after - before)
    });

    match result {
        Ok(applied) => CommandResult::success_with_details(
            "migrate",
            format!("applied {applied} pending migration(s)"),
            Some(serde_json::json!({ "applied": applied })),
        ),
        Err(failure) => CommandResult::from_failure("migrate", failure),
    }
}
