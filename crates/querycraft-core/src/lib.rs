//! # querycraft-core
//!
//! Core types, settings, and error types for the querycraft workspace.
//! This crate has no engine dependencies and provides the foundation for all other crates.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`settings`] - Engine settings (compiler, preview, execution, suggestion)
//! - [`settings_loader`] - Loading settings from TOML/JSON files and the environment
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{QueryCraftError, QueryCraftResult, ValidationError};
pub use settings::{
    CompilerSettings, DuplicateJoinPolicy, ExecutionSettings, LiteralPolicy, PreviewSettings,
    Settings, SuggestionSettings,
};
