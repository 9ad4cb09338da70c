use crmdesk_agent::{Operation, OperationCatalog, OperationError};
use serde_json::Value;

use crate::commands::{build_runtime, load_config, open_store, CommandResult};

pub fn run(operation: &str, raw_args: &str) -> CommandResult {
    let arguments = match serde_json::from_str::<Value>(raw_args) {
        Ok(arguments) => arguments,
        Err(error) => {
            return CommandResult::failure(
                "invoke",
                "invalid_arguments",
                format!("--args must be JSON: {error}"),
                7,
            );
        }
    };

    // Arguments are validated before anything touches the database.
    let parsed = match Operation::parse(operation, arguments) {
        Ok(parsed) => parsed,
        Err(error) => return operation_failure(OperationError::from(error)),
    };

    let config = match load_config("invoke") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("invoke") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let (pool, store) = match open_store(&config).await {
            Ok(opened) => opened,
            Err(failure) => return Err(CommandResult::from_failure("invoke", failure)),
        };
        let outcome = OperationCatalog::new(store).execute(parsed).await;
        pool.close().await;
        outcome.map_err(operation_failure)
    });

    match result {
        Ok(outcome) => {
            CommandResult::success_with_data("invoke", outcome.summary, Some(outcome.payload))
        }
        Err(result) => result,
    }
}

fn operation_failure(error: OperationError) -> CommandResult {
    let exit_code = match &error {
        OperationError::Validation(_) => 7,
        OperationError::NotFound { .. } => 8,
        OperationError::Store(_) => 9,
    };
    CommandResult::failure("invoke", error.kind(), error.to_string(), exit_code)
}
