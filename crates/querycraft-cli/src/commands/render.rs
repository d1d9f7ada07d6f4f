//! The `render` command.
//!
//! Loads a saved template, validates `--param name=value` pairs against its
//! parameters and prints the SQL with every placeholder substituted.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use querycraft_builder::params::ParameterBinder;
use querycraft_builder::template::TemplateRecord;
use querycraft_builder::value::{Value, ValueType};
use querycraft_core::{QueryCraftError, QueryCraftResult, Settings};

use super::read_input;
use crate::command::ManagementCommand;

/// Renders a template with parameter values.
pub struct RenderCommand;

/// Splits a `name=value` argument. The value may itself contain `=`.
pub fn parse_assignment(arg: &str) -> QueryCraftResult<(String, String)> {
    match arg.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim().to_string(), value.to_string())),
        _ => Err(QueryCraftError::ConfigurationError(format!(
            "expected name=value, got '{arg}'"
        ))),
    }
}

/// Renders the template stored at `path` with the given `name=value` pairs.
///
/// Values for array parameters are split on commas. Everything else is
/// passed as text and coerced by the binder.
pub async fn render_file(
    path: impl AsRef<Path>,
    assignments: &[(String, String)],
    settings: &Settings,
) -> QueryCraftResult<String> {
    let json = read_input(path.as_ref()).await?;
    let record: TemplateRecord = serde_json::from_str(&json)
        .map_err(|e| QueryCraftError::SerializationError(format!("invalid template: {e}")))?;
    let template = record.template();

    let mut values = HashMap::new();
    for (name, raw) in assignments {
        let descriptor = template
            .parameters
            .iter()
            .find(|p| &p.name == name)
            .ok_or_else(|| {
                QueryCraftError::TemplateError(format!(
                    "template '{}' has no parameter '{name}'",
                    record.name
                ))
            })?;
        let value = if descriptor.param_type == ValueType::Array {
            Value::List(
                raw.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(Value::from)
                    .collect(),
            )
        } else {
            Value::from(raw.as_str())
        };
        values.insert(name.clone(), value);
    }

    template.apply_validated(&ParameterBinder::new(), &values, settings.compiler.literal_policy)
}

#[async_trait]
impl ManagementCommand for RenderCommand {
    fn name(&self) -> &'static str {
        "render"
    }

    fn help(&self) -> &'static str {
        "Render a saved template with parameter values"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("template")
                .required(true)
                .help("Template JSON file"),
        )
        .arg(
            clap::Arg::new("param")
                .long("param")
                .short('p')
                .action(clap::ArgAction::Append)
                .help("Parameter value as name=value (repeatable)"),
        )
    }

    async fn handle(&self, matches: &clap::ArgMatches, settings: &Settings) -> QueryCraftResult<()> {
        let path = matches
            .get_one::<String>("template")
            .ok_or_else(|| QueryCraftError::ConfigurationError("missing template path".to_string()))?;
        let assignments = matches
            .get_many::<String>("param")
            .into_iter()
            .flatten()
            .map(|arg| parse_assignment(arg.as_str()))
            .collect::<QueryCraftResult<Vec<_>>>()?;

        match render_file(path, &assignments, settings).await {
            Ok(sql) => {
                println!("{sql}");
                Ok(())
            }
            Err(QueryCraftError::ValidationError(error)) => {
                for (name, errors) in &error.field_errors {
                    for e in errors {
                        tracing::warn!(parameter = %name, code = %e.code, "{}", e.message);
                    }
                }
                Err(QueryCraftError::ValidationError(error))
            }
            Err(e) => Err(e),
        }
    }
}
