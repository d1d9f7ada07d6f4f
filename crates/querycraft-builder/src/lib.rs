//! # querycraft-builder
//!
//! The visual query construction engine. A [`QueryModel`](query::QueryModel)
//! holds selected tables, joins, a recursive AND/OR condition tree, grouping,
//! ordering and paging. The [`SqlCompiler`](query::SqlCompiler) turns it into
//! SQL text plus diagnostics, and the parameter extractor and binder detect,
//! type and validate the placeholders embedded in that SQL.
//!
//! ## Architecture
//!
//! The engine core is pure. Compiling, extracting parameters and validating
//! values never fail with `Err`; they return result structs carrying errors and
//! warnings. Only model mutations addressed by id, template application and
//! the external service adapters return [`QueryCraftResult`](querycraft_core::QueryCraftResult).
//!
//! External collaborators (metadata, relationship inference, execution,
//! template persistence) are traits in [`services`] and are injected into a
//! [`BuilderSession`](session::BuilderSession) rather than reached through
//! globals.
//!
//! ## Module Overview
//!
//! - [`value`] - Literal values, canonical value types and condition value shapes
//! - [`catalog`] - The operator catalog and column type inference
//! - [`query`] - Condition tree, joins, the query model and the SQL compiler
//! - [`params`] - Parameter extraction, validation and binding
//! - [`template`] - Reusable query templates
//! - [`services`] - External service boundaries
//! - [`preview`] - Debounced SQL preview
//! - [`polling`] - Execution status polling
//! - [`session`] - The builder session tying everything together

// These clippy lints are intentionally allowed for the engine crate:
// - too_many_lines: the compiler and extractor have long but linear match arms
// - cast_precision_loss: i64-to-f64 casts are acceptable for numeric validation
// - result_large_err: QueryCraftError is the workspace error type and is used consistently
// - format_push_string: format! with push_str is clearer than write! for SQL generation
// - doc_markdown: backtick requirements for documentation items are too strict
// - needless_pass_by_value: some API signatures take owned values for ergonomics
// - return_self_not_must_use: builder pattern methods are self-documenting
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::result_large_err)]
#![allow(clippy::format_push_string)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::match_same_arms)]
// significant_drop_tightening: false positives with async Mutex guards
#![allow(clippy::significant_drop_tightening)]

pub mod catalog;
pub mod params;
pub mod polling;
pub mod preview;
pub mod query;
pub mod services;
pub mod session;
pub mod template;
pub mod value;

// Re-export the most commonly used types at the crate root.
pub use catalog::{available_operators, infer_type, Arity, Operator};
pub use params::{
    extract_parameters, reextract, ParameterBinder, ParameterDescriptor, ParameterKind,
    ValidationReport,
};
pub use query::{
    CompileResult, ConditionGroup, ConditionLeaf, ConditionNode, JoinDescriptor, JoinId, JoinKind,
    Logic, QueryModel, SqlCompiler, TableId, TableSelection,
};
pub use session::{BuilderSession, Services};
pub use services::{
    ColumnMetadata, ExecutionRequest, ExecutionStatus, InMemoryTemplateStore, MetadataProvider,
    QueryExecutionService, QueryHandle, RelationshipSuggestionClient, TemplateStore,
};
pub use template::{QueryTemplate, TemplateRecord, TemplateSource};
pub use value::{ConditionValue, Value, ValueType};
