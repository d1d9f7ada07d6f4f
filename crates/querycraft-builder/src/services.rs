//! External service boundaries.
//!
//! The engine talks to four collaborators it does not implement:
//!
//! - [`MetadataProvider`] lists a table's columns;
//! - [`RelationshipSuggestionClient`] infers likely join columns;
//! - [`QueryExecutionService`] accepts compiled SQL and reports status;
//! - [`TemplateStore`] persists saved templates.
//!
//! Each is an `async_trait` object injected into a
//! [`BuilderSession`](crate::session::BuilderSession), so tests supply fakes.
//! Only [`InMemoryTemplateStore`] ships with the crate.

use std::collections::BTreeMap;

use async_trait::async_trait;
use querycraft_core::{QueryCraftError, QueryCraftResult};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::catalog::infer_type;
use crate::params::BoundParameters;
use crate::template::TemplateRecord;
use crate::value::ValueType;

pub use crate::query::RelationshipSuggestion;

// ── Metadata ─────────────────────────────────────────────────────────

/// One column as reported by the metadata provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetadata {
    /// The column name.
    pub name: String,
    /// The database-native type name, e.g. `varchar(255)`.
    #[serde(rename = "type")]
    pub data_type: String,
    /// Whether the column accepts NULL.
    #[serde(default)]
    pub nullable: bool,
    /// Whether the column is part of the primary key.
    #[serde(default)]
    pub primary_key: bool,
}

impl ColumnMetadata {
    /// Creates a nullable, non-key column.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            primary_key: false,
        }
    }

    /// The canonical type of this column.
    pub fn value_type(&self) -> ValueType {
        infer_type(&self.data_type)
    }
}

/// Supplies table and column metadata.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Lists the columns of `schema.table`.
    async fn get_columns(
        &self,
        data_source_id: &str,
        schema: &str,
        table: &str,
    ) -> QueryCraftResult<Vec<ColumnMetadata>>;
}

// ── Relationship inference ───────────────────────────────────────────

/// Infers likely join columns between two tables.
#[async_trait]
pub trait RelationshipSuggestionClient: Send + Sync {
    /// Returns candidate column pairs, ordered by descending confidence.
    async fn infer(
        &self,
        data_source_id: &str,
        left_table: &str,
        right_table: &str,
    ) -> QueryCraftResult<Vec<RelationshipSuggestion>>;
}

// ── Execution ────────────────────────────────────────────────────────

/// An opaque handle to a submitted query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryHandle(pub String);

impl std::fmt::Display for QueryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A query submitted for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    /// The data source to run against.
    pub data_source_id: String,
    /// The compiled SQL.
    pub sql: String,
    /// Bound parameter values.
    pub parameters: BoundParameters,
    /// Rows per result page.
    pub page_size: u32,
    /// Server-side execution timeout.
    pub timeout_ms: u64,
}

/// The status of a submitted query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Accepted, not started.
    Pending,
    /// Running.
    Running,
    /// Finished successfully.
    Complete,
    /// Finished with an error.
    Error(String),
}

impl ExecutionStatus {
    /// Returns `true` for `Complete` and `Error`.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error(_))
    }
}

/// Runs compiled queries.
#[async_trait]
pub trait QueryExecutionService: Send + Sync {
    /// Submits a query and returns its handle.
    async fn submit(&self, request: ExecutionRequest) -> QueryCraftResult<QueryHandle>;

    /// Reports the current status of a submitted query.
    async fn status(&self, handle: &QueryHandle) -> QueryCraftResult<ExecutionStatus>;
}

// ── Template persistence ─────────────────────────────────────────────

/// CRUD over saved templates.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Stores a new template and returns its id.
    async fn create(&self, record: TemplateRecord) -> QueryCraftResult<Uuid>;

    /// Loads a template.
    async fn get(&self, id: Uuid) -> QueryCraftResult<Option<TemplateRecord>>;

    /// Replaces an existing template.
    async fn update(&self, id: Uuid, record: TemplateRecord) -> QueryCraftResult<()>;

    /// Deletes a template.
    async fn delete(&self, id: Uuid) -> QueryCraftResult<()>;

    /// Lists all templates, ordered by name.
    async fn list(&self) -> QueryCraftResult<Vec<(Uuid, TemplateRecord)>>;
}

/// A process-local [`TemplateStore`].
#[derive(Debug, Default)]
pub struct InMemoryTemplateStore {
    records: RwLock<BTreeMap<Uuid, TemplateRecord>>,
}

impl InMemoryTemplateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing_template(id: Uuid) -> QueryCraftError {
    QueryCraftError::TemplateError(format!("no template with id {id}"))
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn create(&self, record: TemplateRecord) -> QueryCraftResult<Uuid> {
        let id = Uuid::new_v4();
        self.records.write().await.insert(id, record);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> QueryCraftResult<Option<TemplateRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn update(&self, id: Uuid, record: TemplateRecord) -> QueryCraftResult<()> {
        let mut records = self.records.write().await;
        let slot = records.get_mut(&id).ok_or_else(|| missing_template(id))?;
        *slot = record;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> QueryCraftResult<()> {
        self.records
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| missing_template(id))
    }

    async fn list(&self) -> QueryCraftResult<Vec<(Uuid, TemplateRecord)>> {
        let mut all: Vec<(Uuid, TemplateRecord)> = self
            .records
            .read()
            .await
            .iter()
            .map(|(id, record)| (*id, record.clone()))
            .collect();
        all.sort_by(|a, b| a.1.name.cmp(&b.1.name));
        Ok(all)
    }
}
