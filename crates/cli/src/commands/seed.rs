use crmdesk_db::{DemoDataset, SeedResult};

use crate::commands::{build_runtime, load_config, open_store, CommandResult, Failure};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let (pool, store) = open_store(&config).await?;
        let seeded: Result<SeedResult, Failure> = DemoDataset::load(&store)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 6u8));
        pool.close().await;
        seeded
    });

    match result {
        Ok(seeded) => CommandResult::success_with_data(
            "seed",
            seed_message(&seeded),
            serde_json::to_value(&seeded).ok(),
        ),
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}

fn seed_message(seeded: &SeedResult) -> String {
    if seeded.skipped {
        return "store already holds records; demo data not loaded".to_string();
    }
    format!(
        "demo data loaded: {} contacts, {} leads, {} tasks",
        seeded.contacts, seeded.leads, seeded.tasks
    )
}
