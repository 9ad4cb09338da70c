use std::process::ExitCode;

fn main() -> ExitCode {
    crmdesk_cli::run()
}
