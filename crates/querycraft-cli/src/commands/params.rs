//! The `params` command.
//!
//! Lists the placeholders found in a SQL file with their inferred types.

use std::path::Path;

use async_trait::async_trait;
use querycraft_builder::params::{extract_parameters, ParameterDescriptor, ParameterKind};
use querycraft_core::{QueryCraftError, QueryCraftResult, Settings};

use super::read_input;
use crate::command::ManagementCommand;

/// Prints the parameters of a SQL file.
pub struct ParamsCommand;

/// Extracts the parameters of the SQL text at `path`.
pub async fn params_file(path: impl AsRef<Path>) -> QueryCraftResult<Vec<ParameterDescriptor>> {
    let sql = read_input(path.as_ref()).await?;
    Ok(extract_parameters(&sql))
}

/// One aligned line per parameter: name, type, kind.
pub fn format_table(params: &[ParameterDescriptor]) -> String {
    let width = params.iter().map(|p| p.name.len()).max().unwrap_or(0);
    params
        .iter()
        .map(|p| {
            let kind = match p.kind {
                ParameterKind::Named => "named",
                ParameterKind::Positional => "positional",
            };
            format!("{:width$}  {:<7}  {kind}", p.name, p.param_type.to_string())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl ManagementCommand for ParamsCommand {
    fn name(&self) -> &'static str {
        "params"
    }

    fn help(&self) -> &'static str {
        "List the parameters of a SQL file"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(clap::Arg::new("sql").required(true).help("SQL file"))
            .arg(
                clap::Arg::new("json")
                    .long("json")
                    .action(clap::ArgAction::SetTrue)
                    .help("Print parameter descriptors as JSON"),
            )
    }

    async fn handle(&self, matches: &clap::ArgMatches, _settings: &Settings) -> QueryCraftResult<()> {
        let path = matches
            .get_one::<String>("sql")
            .ok_or_else(|| QueryCraftError::ConfigurationError("missing SQL path".to_string()))?;
        let params = params_file(path).await?;
        tracing::debug!(file = %path, count = params.len(), "parameters extracted");

        if matches.get_flag("json") {
            println!("{}", serde_json::to_string_pretty(&params)?);
        } else if !params.is_empty() {
            println!("{}", format_table(&params));
        }
        Ok(())
    }
}
