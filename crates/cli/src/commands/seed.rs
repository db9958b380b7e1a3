use caseflow_db::{DemoDataset, SeedResult};

use crate::commands::context::{execute, open_pool};
use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let result = execute("seed", |config| async move {
        let pool = open_pool(&config).await?;

        let seed_result = DemoDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
        pool.close().await;

        if !verification.all_present {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            return Err((
                "seed_verification",
                format!("seed verification failed for checks: {}", failed_checks.join(", ")),
                6u8,
            ));
        }

        Ok(seed_result)
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", summary(&seeded)),
        Err(failure) => failure,
    }
}

fn summary(seeded: &SeedResult) -> String {
    let mut lines = vec!["seeded demo routing data:".to_string()];
    lines.extend(seeded.providers_seeded.iter().map(|provider| format!("  - provider: {provider}")));
    lines.extend(seeded.rules_seeded.iter().map(|rule| format!("  - rule: {rule}")));
    lines.join("\n")
}
