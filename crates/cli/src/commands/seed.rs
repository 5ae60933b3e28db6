use crate::commands::{open_pool, prepare, CommandResult, Failure, EXIT_MIGRATION};
use docflow_db::{migrations, DemoSeedDataset};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare() {
        Ok(prepared) => prepared,
        Err(failure) => return CommandResult::from_failure("seed", failure),
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

        let seeded = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_MIGRATION))?;
        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), EXIT_MIGRATION))?;
        pool.close().await;

        if !verification.all_present {
            return Err(("seed_verification", failed_checks_message(&verification.checks), EXIT_MIGRATION));
        }
        Ok::<_, Failure>(seeded)
    });

    match result {
        Ok(seeded) => CommandResult::success_with_details(
            "seed",
            format!(
                "demo organisation loaded: {} faculties, {} departments, document types {}",
                seeded.faculties,
                seeded.departments,
                seeded.document_types.join(", ")
            ),
            serde_json::to_value(&seeded).ok(),
        ),
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}

fn failed_checks_message(checks: &[(&'static str, bool)]) -> String {
    let failed =
        checks.iter().filter_map(|(check, present)| (!present).then_some(*check)).collect::<Vec<_>>();
    if failed.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed.join(", "))
    }
}
