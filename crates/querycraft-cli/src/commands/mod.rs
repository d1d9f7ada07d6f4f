//! Built-in commands.
//!
//! Each command implements [`ManagementCommand`](crate::command::ManagementCommand)
//! and exposes its work as a plain async function so it can be reused
//! without going through clap.

pub mod check;
pub mod compile;
pub mod params;
pub mod render;

use std::path::Path;

pub use check::CheckCommand;
pub use compile::CompileCommand;
pub use params::ParamsCommand;
pub use render::RenderCommand;

use querycraft_core::{QueryCraftError, QueryCraftResult};

use crate::command::CommandRegistry;

/// Registers every built-in command into `registry`.
pub fn register_builtin_commands(registry: &mut CommandRegistry) {
    registry.register(Box::new(CompileCommand));
    registry.register(Box::new(ParamsCommand));
    registry.register(Box::new(RenderCommand));
    registry.register(Box::new(CheckCommand));
}

/// Reads an input file, naming the path in the error.
pub(crate) async fn read_input(path: &Path) -> QueryCraftResult<String> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        QueryCraftError::IoError(std::io::Error::new(
            e.kind(),
            format!("failed to read {}: {e}", path.display()),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_builtin_commands() {
        let mut registry = CommandRegistry::new();
        register_builtin_commands(&mut registry);
        assert_eq!(registry.list_commands(), vec!["check", "compile", "params", "render"]);
    }

    #[tokio::test]
    async fn test_read_input_names_path() {
        let err = read_input(Path::new("/nonexistent/input.sql")).await.unwrap_err();
        assert!(err.to_string().contains("/nonexistent/input.sql"));
    }
}
