//! The `compile` command.
//!
//! Reads a model snapshot (the JSON written by `QueryModel::snapshot`) and
//! prints the SQL it compiles to.

use std::path::Path;

use async_trait::async_trait;
use querycraft_builder::query::{CompileResult, QueryModel, SqlCompiler};
use querycraft_core::{QueryCraftError, QueryCraftResult, Settings};

use super::read_input;
use crate::command::ManagementCommand;

/// Compiles a saved query model to SQL.
pub struct CompileCommand;

/// Loads the model at `path` and compiles it with the configured compiler.
pub async fn compile_file(path: impl AsRef<Path>, settings: &Settings) -> QueryCraftResult<CompileResult> {
    let json = read_input(path.as_ref()).await?;
    let model = QueryModel::restore(&json)
        .map_err(|e| QueryCraftError::SerializationError(format!("invalid model snapshot: {e}")))?;
    Ok(SqlCompiler::new(settings.compiler.clone()).compile(&model))
}

#[async_trait]
impl ManagementCommand for CompileCommand {
    fn name(&self) -> &'static str {
        "compile"
    }

    fn help(&self) -> &'static str {
        "Compile a saved query model to SQL"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("model")
                .required(true)
                .help("Model snapshot JSON file"),
        )
        .arg(
            clap::Arg::new("json")
                .long("json")
                .action(clap::ArgAction::SetTrue)
                .help("Print the full compile result as JSON"),
        )
    }

    async fn handle(&self, matches: &clap::ArgMatches, settings: &Settings) -> QueryCraftResult<()> {
        let path = matches
            .get_one::<String>("model")
            .ok_or_else(|| QueryCraftError::ConfigurationError("missing model path".to_string()))?;
        let result = compile_file(path, settings).await?;

        if matches.get_flag("json") {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else if !result.sql.is_empty() {
            println!("{}", result.sql);
        }
        for warning in &result.warnings {
            tracing::warn!(model = %path, "{warning}");
        }

        if result.valid {
            Ok(())
        } else {
            Err(QueryCraftError::CompileError(result.errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use querycraft_builder::query::TableSelection;
    use querycraft_builder::value::ValueType;

    use super::*;

    fn write_model(model: &QueryModel) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), model.snapshot().unwrap()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_compile_file() {
        let mut model = QueryModel::new();
        let users = model.add_table(TableSelection::new("", "users").with_column("id", ValueType::Number));
        model.toggle_column(users, "id").unwrap();
        model.set_limit(Some(5));
        let file = write_model(&model);

        let result = compile_file(file.path(), &Settings::default()).await.unwrap();
        assert!(result.valid);
        assert_eq!(result.sql, "SELECT users.id FROM users\nLIMIT 5");
    }

    #[tokio::test]
    async fn test_compile_empty_model_is_invalid() {
        let file = write_model(&QueryModel::new());
        let result = compile_file(file.path(), &Settings::default()).await.unwrap();
        assert!(!result.valid);
        assert!(result.sql.is_empty());
    }

    #[tokio::test]
    async fn test_compile_rejects_garbage() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "{ not json").unwrap();
        assert!(matches!(
            compile_file(file.path(), &Settings::default()).await,
            Err(QueryCraftError::SerializationError(_))
        ));
    }

    #[tokio::test]
    async fn test_compile_missing_file() {
        assert!(matches!(
            compile_file("/nonexistent/model.json", &Settings::default()).await,
            Err(QueryCraftError::IoError(_))
        ));
    }
}
