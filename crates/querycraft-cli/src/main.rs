//! The `querycraft` binary.

use std::process::ExitCode;

use querycraft_cli::command::{load_settings, CommandRegistry};
use querycraft_cli::commands::register_builtin_commands;
use querycraft_core::logging::setup_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let mut registry = CommandRegistry::new();
    register_builtin_commands(&mut registry);
    let matches = registry.build_cli().get_matches();

    let settings = match load_settings(&matches) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("querycraft: {e}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&settings);

    match registry.execute(&matches, &settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("querycraft: {e}");
            ExitCode::FAILURE
        }
    }
}
