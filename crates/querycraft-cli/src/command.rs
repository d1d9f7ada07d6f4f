//! Subcommand plumbing for the `querycraft` binary.
//!
//! A [`CommandRegistry`] owns every [`ManagementCommand`], turns them into a
//! clap application and routes parsed arguments back to the right handler.
//!
//! ## Writing a command
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use querycraft_cli::command::ManagementCommand;
//! use querycraft_core::{QueryCraftResult, Settings};
//!
//! struct SourceCommand;
//!
//! #[async_trait]
//! impl ManagementCommand for SourceCommand {
//!     fn name(&self) -> &str { "source" }
//!     fn help(&self) -> &str { "Print the configured data source" }
//!
//!     async fn handle(
//!         &self,
//!         _matches: &clap::ArgMatches,
//!         settings: &Settings,
//!     ) -> QueryCraftResult<()> {
//!         println!("{}", settings.data_source_id);
//!         Ok(())
//!     }
//! }
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use querycraft_core::{settings_loader, QueryCraftError, QueryCraftResult, Settings};

/// One `querycraft <name>` subcommand.
#[async_trait]
pub trait ManagementCommand: Send + Sync {
    /// Subcommand name on the command line.
    fn name(&self) -> &str;

    /// One-line description shown in `--help`.
    fn help(&self) -> &str;

    /// Declares the subcommand's arguments on `cmd`.
    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd
    }

    async fn handle(&self, matches: &clap::ArgMatches, settings: &Settings) -> QueryCraftResult<()>;
}

/// The set of subcommands the binary knows about, ordered by name.
#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Box<dyn ManagementCommand>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `command`. A later registration under the same name wins.
    pub fn register(&mut self, command: Box<dyn ManagementCommand>) {
        self.commands.insert(command.name().to_owned(), command);
    }

    pub fn get(&self, name: &str) -> Option<&dyn ManagementCommand> {
        self.commands.get(name).map(AsRef::as_ref)
    }

    /// Names in alphabetical order.
    pub fn list_commands(&self) -> Vec<&str> {
        self.commands.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// The clap application: a global `--config` option plus one required
    /// subcommand per registered command.
    pub fn build_cli(&self) -> clap::Command {
        let config = clap::Arg::new("config")
            .long("config")
            .short('c')
            .global(true)
            .help("Settings file (.toml or .json)");

        self.commands.iter().fold(
            clap::Command::new("querycraft")
                .about("Build, compile and render SQL queries")
                .subcommand_required(true)
                .arg(config),
            |app, (name, command)| {
                // clap wants 'static names; commands are registered once per process.
                let name: &'static str = Box::leak(name.clone().into_boxed_str());
                let sub = clap::Command::new(name).about(command.help().to_owned());
                app.subcommand(command.add_arguments(sub))
            },
        )
    }

    /// Runs the handler of whichever subcommand `matches` selected.
    pub async fn execute(&self, matches: &clap::ArgMatches, settings: &Settings) -> QueryCraftResult<()> {
        let Some((name, sub_matches)) = matches.subcommand() else {
            return Err(QueryCraftError::ConfigurationError("no subcommand given".to_string()));
        };
        let Some(command) = self.get(name) else {
            return Err(QueryCraftError::ConfigurationError(format!("unknown command '{name}'")));
        };
        tracing::debug!(command = name, "dispatching");
        command.handle(sub_matches, settings).await
    }
}

/// Loads settings from the `--config` file when given, otherwise from the
/// environment alone. Environment overrides apply in both cases.
pub fn load_settings(matches: &clap::ArgMatches) -> QueryCraftResult<Settings> {
    match matches.get_one::<String>("config") {
        Some(path) => settings_loader::from_file_with_env(path),
        None => Ok(settings_loader::from_env()),
    }
}
