//! Hand-written fakes for the external service traits.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use querycraft_builder::query::RelationshipSuggestion;
use querycraft_builder::services::{
    ColumnMetadata, ExecutionRequest, ExecutionStatus, InMemoryTemplateStore, MetadataProvider,
    QueryExecutionService, QueryHandle, RelationshipSuggestionClient,
};
use querycraft_builder::session::{BuilderSession, Services};
use querycraft_core::{QueryCraftError, QueryCraftResult, Settings};
use tokio::sync::Mutex;

// ── Metadata ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FakeMetadata {
    tables: HashMap<String, Vec<ColumnMetadata>>,
}

impl FakeMetadata {
    pub fn with_table(mut self, table: &str, columns: &[(&str, &str)]) -> Self {
        self.tables.insert(
            table.to_string(),
            columns
                .iter()
                .map(|(name, ty)| ColumnMetadata::new(*name, *ty))
                .collect(),
        );
        self
    }
}

#[async_trait]
impl MetadataProvider for FakeMetadata {
    async fn get_columns(
        &self,
        _data_source_id: &str,
        _schema: &str,
        table: &str,
    ) -> QueryCraftResult<Vec<ColumnMetadata>> {
        self.tables
            .get(table)
            .cloned()
            .ok_or_else(|| QueryCraftError::ServiceError(format!("no such table: {table}")))
    }
}

// ── Relationship suggestions ────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FakeSuggestions {
    pub calls: Mutex<Vec<(String, String)>>,
    answers: HashMap<(String, String), Vec<RelationshipSuggestion>>,
    fail: bool,
}

impl FakeSuggestions {
    pub fn with_answer(mut self, left: &str, right: &str, pairs: &[(&str, &str, f64)]) -> Self {
        self.answers.insert(
            (left.to_string(), right.to_string()),
            pairs
                .iter()
                .map(|(l, r, c)| RelationshipSuggestion {
                    left_column: (*l).to_string(),
                    right_column: (*r).to_string(),
                    confidence: *c,
                })
                .collect(),
        );
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl RelationshipSuggestionClient for FakeSuggestions {
    async fn infer(
        &self,
        _data_source_id: &str,
        left_table: &str,
        right_table: &str,
    ) -> QueryCraftResult<Vec<RelationshipSuggestion>> {
        self.calls
            .lock()
            .await
            .push((left_table.to_string(), right_table.to_string()));
        if self.fail {
            return Err(QueryCraftError::ServiceError("inference offline".to_string()));
        }
        Ok(self
            .answers
            .get(&(left_table.to_string(), right_table.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

// ── Execution ───────────────────────────────────────────────────────

#[derive(Debug)]
pub struct FakeExecution {
    pub submitted: Mutex<Vec<ExecutionRequest>>,
    /// Status checks answered `Running` before `Complete`.
    running_for: u32,
    checks: Mutex<u32>,
}

impl FakeExecution {
    pub fn completing_after(running_for: u32) -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
            running_for,
            checks: Mutex::new(0),
        }
    }
}

#[async_trait]
impl QueryExecutionService for FakeExecution {
    async fn submit(&self, request: ExecutionRequest) -> QueryCraftResult<QueryHandle> {
        let mut submitted = self.submitted.lock().await;
        submitted.push(request);
        Ok(QueryHandle(format!("q{}", submitted.len())))
    }

    async fn status(&self, _handle: &QueryHandle) -> QueryCraftResult<ExecutionStatus> {
        let mut checks = self.checks.lock().await;
        *checks += 1;
        if *checks > self.running_for {
            Ok(ExecutionStatus::Complete)
        } else {
            Ok(ExecutionStatus::Running)
        }
    }
}

// ── Session wiring ──────────────────────────────────────────────────

pub struct Fakes {
    pub suggestions: Arc<FakeSuggestions>,
    pub execution: Arc<FakeExecution>,
    pub templates: Arc<InMemoryTemplateStore>,
}

pub fn shop_metadata() -> FakeMetadata {
    FakeMetadata::default()
        .with_table("users", &[("id", "integer"), ("status", "varchar(20)")])
        .with_table("orders", &[("id", "integer"), ("user_id", "integer"), ("total", "numeric(10,2)")])
        .with_table("payments", &[("id", "integer"), ("order_id", "integer"), ("user_id", "integer")])
}

pub fn session_with(
    settings: Settings,
    suggestions: FakeSuggestions,
    execution: FakeExecution,
) -> (BuilderSession, Fakes) {
    let fakes = Fakes {
        suggestions: Arc::new(suggestions),
        execution: Arc::new(execution),
        templates: Arc::new(InMemoryTemplateStore::new()),
    };
    let services = Services {
        metadata: Arc::new(shop_metadata()),
        suggestions: fakes.suggestions.clone(),
        execution: fakes.execution.clone(),
        templates: fakes.templates.clone(),
    };
    (BuilderSession::new(settings, services), fakes)
}

pub fn session() -> (BuilderSession, Fakes) {
    session_with(
        Settings::default(),
        FakeSuggestions::default(),
        FakeExecution::completing_after(0),
    )
}
