//! # querycraft
//!
//! The meta-crate re-exporting the querycraft workspace. Depend on this to get
//! the whole engine, or on the individual crates for finer-grained control.
//!
//! ```
//! use querycraft::prelude::*;
//!
//! let mut model = QueryModel::new();
//! model.add_table(TableSelection::new("", "users"));
//! let result = SqlCompiler::new(CompilerSettings::default()).compile(&model);
//! assert_eq!(result.sql, "SELECT * FROM users");
//!
//! let params = extract_parameters("SELECT * FROM users WHERE id = :userId");
//! assert_eq!(params[0].param_type, ValueType::Number);
//! ```

/// Error types, settings, and logging setup.
pub use querycraft_core as core;

/// The query construction engine.
pub use querycraft_builder as builder;

/// Command-line tooling.
#[cfg(feature = "cli")]
pub use querycraft_cli as cli;

// Third-party re-exports
pub use async_trait;
pub use chrono;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
pub use tracing_subscriber;

/// The types most callers need.
pub mod prelude {
    pub use querycraft_builder::{
        available_operators, extract_parameters, reextract, BuilderSession, CompileResult,
        ConditionGroup, ConditionLeaf, ConditionNode, ConditionValue, JoinKind, Logic, Operator,
        ParameterBinder, ParameterDescriptor, QueryModel, QueryTemplate, Services, SqlCompiler,
        TableSelection, TemplateRecord, Value, ValueType,
    };
    pub use querycraft_core::{
        CompilerSettings, QueryCraftError, QueryCraftResult, Settings, ValidationError,
    };
}
