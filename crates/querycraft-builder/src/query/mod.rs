//! Query model, condition tree, joins and SQL compilation.
//!
//! This module provides the structured representation of a visually built
//! query and the compiler that turns it into SQL text:
//!
//! - [`conditions`] - The recursive AND/OR condition tree with copy-on-write edits
//! - [`joins`] - Join descriptors and the relationship suggestion flow
//! - [`model`] - The [`QueryModel`] aggregate and its table operations
//! - [`literal`] - Literal rendering and the numeric quoting policy
//! - [`compiler`] - The [`SqlCompiler`]

pub mod compiler;
pub mod conditions;
pub mod joins;
pub mod literal;
pub mod model;

pub use compiler::{CompileResult, SqlCompiler};
pub use conditions::{ColumnBinding, ConditionGroup, ConditionLeaf, ConditionNode, LeafPatch, Logic};
pub use joins::{
    JoinDescriptor, JoinId, JoinKind, JoinSide, RelationshipSuggestion, SuggestionOutcome,
    SuggestionRequest, SuggestionResponse,
};
pub use model::{
    Aggregate, ColumnRef, ColumnSelection, OrderBy, QueryModel, SortDirection, TableId,
    TableSelection,
};
