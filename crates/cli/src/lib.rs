pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "crmdesk",
    about = "crmdesk operator CLI",
    long_about = "Apply migrations, load demo records, inspect configuration, and run catalog operations against the record store.",
    after_help = "Examples:\n  crmdesk migrate\n  crmdesk seed\n  crmdesk invoke list_leads --args '{\"status\":\"new\"}'"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo contacts, leads and tasks unless records already exist")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Run one catalog operation directly against the record store")]
    Invoke {
        #[arg(help = "Operation name, e.g. list_leads or update_task")]
        operation: String,
        #[arg(long, default_value = "{}", help = "Operation arguments as a JSON object")]
        args: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Invoke { operation, args } => commands::invoke::run(&operation, &args),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn invoke_arguments_default_to_an_empty_object() {
        let cli = Cli::try_parse_from(["crmdesk", "invoke", "list_contacts"]).expect("parse");

        match cli.command {
            Command::Invoke { operation, args } => {
                assert_eq!(operation, "list_contacts");
                assert_eq!(args, "{}");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn invoke_requires_an_operation_name() {
        assert!(Cli::try_parse_from(["crmdesk", "invoke"]).is_err());
    }
}
