//! The builder session.
//!
//! A [`BuilderSession`] owns one query under construction and the services it
//! talks to. Every model edit is copy-on-write: the current model is cloned,
//! the edit is applied to the clone, and the clone replaces the current model
//! only if the edit succeeded. Edits that need an external call finish the
//! call first and mutate afterwards, so a failed call never leaves the model
//! half-changed.
//!
//! After each successful edit the session re-derives the parameter list from
//! the live SQL and, when a preview is running, publishes the new model to it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use querycraft_core::logging::session_span;
use querycraft_core::{QueryCraftError, QueryCraftResult, Settings};
use tokio::sync::watch;
use tracing::{debug, info, Instrument, Span};
use uuid::Uuid;

use crate::params::{reextract, ParameterBinder, ParameterDescriptor, ValidationReport};
use crate::polling::ExecutionPoller;
use crate::preview::PreviewDebouncer;
use crate::query::{
    Aggregate, CompileResult, ConditionGroup, JoinId, JoinKind, LeafPatch, Logic, QueryModel,
    SortDirection, SqlCompiler, SuggestionOutcome, SuggestionRequest, SuggestionResponse, TableId,
    TableSelection,
};
use crate::services::{
    ExecutionRequest, ExecutionStatus, MetadataProvider, QueryExecutionService, QueryHandle,
    RelationshipSuggestionClient, TemplateStore,
};
use crate::template::{QueryTemplate, TemplateRecord, TemplateSource};
use crate::value::{Value, ValueType};

/// The external collaborators a session uses.
#[derive(Clone)]
pub struct Services {
    /// Column metadata.
    pub metadata: Arc<dyn MetadataProvider>,
    /// Join column inference.
    pub suggestions: Arc<dyn RelationshipSuggestionClient>,
    /// Query execution.
    pub execution: Arc<dyn QueryExecutionService>,
    /// Template persistence.
    pub templates: Arc<dyn TemplateStore>,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

/// One query under construction.
pub struct BuilderSession {
    id: String,
    settings: Settings,
    services: Services,
    compiler: SqlCompiler,
    binder: ParameterBinder,
    model: Arc<QueryModel>,
    raw_sql: Option<String>,
    parameters: Vec<ParameterDescriptor>,
    values: HashMap<String, Value>,
    preview: Option<PreviewDebouncer>,
    span: Span,
}

impl fmt::Debug for BuilderSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderSession")
            .field("id", &self.id)
            .field("model", &self.model)
            .field("raw_sql", &self.raw_sql)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

impl BuilderSession {
    /// Starts a session with an empty model.
    pub fn new(settings: Settings, services: Services) -> Self {
        let id = Uuid::new_v4().to_string();
        let span = session_span(&id, &settings.data_source_id);
        span.in_scope(|| debug!("builder session started"));
        Self {
            compiler: SqlCompiler::new(settings.compiler.clone()),
            id,
            settings,
            services,
            binder: ParameterBinder::new(),
            model: Arc::new(QueryModel::new()),
            raw_sql: None,
            parameters: Vec::new(),
            values: HashMap::new(),
            preview: None,
            span,
        }
    }

    /// Replaces the parameter binder (to register custom validators).
    pub fn with_binder(mut self, binder: ParameterBinder) -> Self {
        self.binder = binder;
        self
    }

    /// The session id used in log spans.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The settings in effect.
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The current model snapshot.
    pub fn model(&self) -> Arc<QueryModel> {
        Arc::clone(&self.model)
    }

    // ── Copy-on-write plumbing ───────────────────────────────────────

    fn edit<T, F>(&mut self, edit: F) -> QueryCraftResult<T>
    where
        F: FnOnce(&mut QueryModel) -> QueryCraftResult<T>,
    {
        let span = self.span.clone();
        let _entered = span.enter();
        let mut next = QueryModel::clone(&self.model);
        let out = edit(&mut next)?;
        self.commit(next);
        Ok(out)
    }

    fn commit(&mut self, next: QueryModel) {
        self.model = Arc::new(next);
        self.model_changed();
    }

    fn model_changed(&mut self) {
        if let Some(preview) = &self.preview {
            preview.notify(Arc::clone(&self.model));
        }
        if self.raw_sql.is_none() {
            self.refresh_parameters();
        }
    }

    // ── Tables and columns ───────────────────────────────────────────

    /// Fetches a table's columns and adds it to the model.
    ///
    /// # Errors
    ///
    /// Returns the metadata provider's error; the model is unchanged.
    pub async fn add_table(&mut self, schema: &str, table: &str) -> QueryCraftResult<TableId> {
        let columns = self
            .services
            .metadata
            .get_columns(&self.settings.data_source_id, schema, table)
            .instrument(self.span.clone())
            .await?;
        let selection = columns
            .iter()
            .fold(TableSelection::new(schema, table), |selection, column| {
                selection.with_column(&column.name, column.value_type())
            });
        let id = self.edit(|model| Ok(model.add_table(selection)))?;
        self.span
            .in_scope(|| debug!(table = %table, columns = columns.len(), "table added"));
        Ok(id)
    }

    /// Removes a table and everything that references it.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::UnknownTable`] for an unknown id.
    pub fn remove_table(&mut self, id: TableId) -> QueryCraftResult<TableSelection> {
        self.edit(|model| model.remove_table(id))
    }

    /// Sets or clears a table alias.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::UnknownTable`] for an unknown id.
    pub fn set_alias(&mut self, id: TableId, alias: Option<String>) -> QueryCraftResult<()> {
        self.edit(|model| model.set_alias(id, alias))
    }

    /// Flips a column's selection and returns the new state.
    ///
    /// # Errors
    ///
    /// Returns an unknown-table or unknown-column error.
    pub fn toggle_column(&mut self, table: TableId, column: &str) -> QueryCraftResult<bool> {
        self.edit(|model| model.toggle_column(table, column))
    }

    /// Sets or clears a column's aggregate.
    ///
    /// # Errors
    ///
    /// Returns an unknown-table or unknown-column error.
    pub fn set_aggregate(
        &mut self,
        table: TableId,
        column: &str,
        aggregate: Option<Aggregate>,
    ) -> QueryCraftResult<()> {
        self.edit(|model| model.set_aggregate(table, column, aggregate))
    }

    /// Groups by a column.
    ///
    /// # Errors
    ///
    /// Returns an unknown-table or unknown-column error.
    pub fn add_group_by(&mut self, table: TableId, column: &str) -> QueryCraftResult<()> {
        self.edit(|model| {
            let column = model.column_ref(table, column)?;
            model.add_group_by(column)
        })
    }

    /// Orders by a column.
    ///
    /// # Errors
    ///
    /// Returns an unknown-table or unknown-column error.
    pub fn add_order_by(
        &mut self,
        table: TableId,
        column: &str,
        direction: SortDirection,
    ) -> QueryCraftResult<()> {
        self.edit(|model| {
            let column = model.column_ref(table, column)?;
            model.add_order_by(column, direction)
        })
    }

    /// Sets or clears the row limit and offset.
    pub fn set_paging(&mut self, limit: Option<u64>, offset: Option<u64>) {
        let mut next = QueryModel::clone(&self.model);
        next.set_limit(limit);
        next.set_offset(offset);
        self.commit(next);
    }

    // ── Joins ────────────────────────────────────────────────────────

    /// Adds an empty INNER join.
    pub fn add_join(&mut self) -> JoinId {
        let mut next = QueryModel::clone(&self.model);
        let id = next.add_join();
        self.commit(next);
        id
    }

    /// Sets both tables of a join.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::InvalidJoin`] for a self-join, or an
    /// unknown-id error.
    pub fn set_join_tables(
        &mut self,
        id: JoinId,
        left: TableId,
        right: TableId,
    ) -> QueryCraftResult<()> {
        self.edit(|model| model.set_join_tables(id, left, right))
    }

    /// Sets both tables of a join and asks for column suggestions.
    ///
    /// The table edit is validated and committed before the suggestion
    /// service is called, so a self-join never reaches the service.
    ///
    /// # Errors
    ///
    /// Returns the table edit's error. Suggestion failures are reported in
    /// the outcome instead.
    pub async fn link_tables(
        &mut self,
        id: JoinId,
        left: TableId,
        right: TableId,
    ) -> QueryCraftResult<SuggestionOutcome> {
        self.set_join_tables(id, left, right)?;
        self.suggest_join(id).await
    }

    /// Sets both columns of a join.
    ///
    /// # Errors
    ///
    /// Returns an invalid-join, unknown-column or unknown-id error.
    pub fn set_join_columns(
        &mut self,
        id: JoinId,
        left: Option<String>,
        right: Option<String>,
    ) -> QueryCraftResult<()> {
        self.edit(|model| model.set_join_columns(id, left, right))
    }

    /// Sets the join kind.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::UnknownJoin`] for an unknown id.
    pub fn set_join_kind(&mut self, id: JoinId, kind: JoinKind) -> QueryCraftResult<()> {
        self.edit(|model| model.set_join_kind(id, kind))
    }

    /// Removes a join.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::UnknownJoin`] for an unknown id.
    pub fn remove_join(&mut self, id: JoinId) -> QueryCraftResult<()> {
        self.edit(|model| model.remove_join(id).map(|_| ()))
    }

    /// Captures a suggestion request for the join's current endpoints.
    /// Returns `Ok(None)` while either table is unset.
    ///
    /// # Errors
    ///
    /// Returns an unknown-join or invalid-join error.
    pub fn request_suggestion(&self, id: JoinId) -> QueryCraftResult<Option<SuggestionRequest>> {
        self.model
            .begin_suggestion(id, &self.settings.data_source_id)
    }

    /// Merges a resolved suggestion request. Stale responses are dropped.
    pub fn apply_suggestion(&mut self, response: SuggestionResponse) -> SuggestionOutcome {
        let span = self.span.clone();
        let _entered = span.enter();
        let mut next = QueryModel::clone(&self.model);
        let outcome = next.apply_suggestions(response, &self.settings.suggestion);
        if !matches!(outcome, SuggestionOutcome::Stale | SuggestionOutcome::JoinRemoved) {
            self.commit(next);
        }
        outcome
    }

    /// Requests, awaits and merges column suggestions for a join.
    ///
    /// # Errors
    ///
    /// Returns an unknown-join or invalid-join error. Service failures are
    /// reported as [`SuggestionOutcome::Unavailable`].
    pub async fn suggest_join(&mut self, id: JoinId) -> QueryCraftResult<SuggestionOutcome> {
        let Some(request) = self.request_suggestion(id)? else {
            return Ok(SuggestionOutcome::NoSuggestion);
        };
        let response = request
            .resolve(self.services.suggestions.as_ref())
            .instrument(self.span.clone())
            .await;
        Ok(self.apply_suggestion(response))
    }

    // ── Conditions ───────────────────────────────────────────────────

    /// Applies `edit` to the condition group at `path` (child indexes from
    /// the root group downward).
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::UnknownCondition`] for a bad path, or the
    /// edit's own error. The model is unchanged on error.
    pub fn edit_conditions<F>(&mut self, path: &[usize], edit: F) -> QueryCraftResult<()>
    where
        F: FnOnce(&ConditionGroup) -> QueryCraftResult<ConditionGroup>,
    {
        self.edit(|model| model.update_conditions(|root| root.with_group_at(path, edit)))
    }

    /// Appends an empty leaf to the group at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::UnknownCondition`] for a bad path.
    pub fn add_condition(&mut self, path: &[usize]) -> QueryCraftResult<()> {
        self.edit_conditions(path, |group| Ok(group.add_leaf()))
    }

    /// Appends an empty nested group to the group at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::UnknownCondition`] for a bad path.
    pub fn add_condition_group(&mut self, path: &[usize]) -> QueryCraftResult<()> {
        self.edit_conditions(path, |group| Ok(group.add_group()))
    }

    /// Edits one field of the leaf at `index` in the group at `path`.
    ///
    /// # Errors
    ///
    /// Returns an unknown-condition or invalid-condition error.
    pub fn update_condition(
        &mut self,
        path: &[usize],
        index: usize,
        patch: LeafPatch,
    ) -> QueryCraftResult<()> {
        self.edit_conditions(path, |group| group.update_leaf(index, patch))
    }

    /// Removes the child at `index` from the group at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::UnknownCondition`] for a bad path or index.
    pub fn remove_condition(&mut self, path: &[usize], index: usize) -> QueryCraftResult<()> {
        self.edit_conditions(path, |group| group.remove_at(index))
    }

    /// Switches the group at `path` between AND and OR.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::UnknownCondition`] for a bad path.
    pub fn set_logic(&mut self, path: &[usize], logic: Logic) -> QueryCraftResult<()> {
        self.edit_conditions(path, |group| Ok(group.with_logic(logic)))
    }

    // ── SQL ──────────────────────────────────────────────────────────

    /// Compiles the current model.
    pub fn compile(&self) -> CompileResult {
        let _entered = self.span.enter();
        self.compiler.compile(&self.model)
    }

    /// Switches to hand-written SQL. The model is kept but no longer drives
    /// the SQL until [`clear_sql`](Self::clear_sql).
    pub fn set_sql(&mut self, sql: impl Into<String>) {
        self.raw_sql = Some(sql.into());
        self.refresh_parameters();
    }

    /// Returns to model-driven SQL.
    pub fn clear_sql(&mut self) {
        self.raw_sql = None;
        self.refresh_parameters();
    }

    /// Returns `true` while hand-written SQL is in effect.
    pub const fn is_raw_sql(&self) -> bool {
        self.raw_sql.is_some()
    }

    /// The live SQL: the hand-written text, or the compiled model.
    pub fn current_sql(&self) -> String {
        match &self.raw_sql {
            Some(sql) => sql.clone(),
            None => self.compile().sql,
        }
    }

    fn executable_sql(&self) -> QueryCraftResult<String> {
        match &self.raw_sql {
            Some(sql) if sql.trim().is_empty() => {
                Err(QueryCraftError::CompileError("no SQL to execute".to_string()))
            }
            Some(sql) => Ok(sql.clone()),
            None => {
                let compiled = self.compile();
                if compiled.valid {
                    Ok(compiled.sql)
                } else {
                    Err(QueryCraftError::CompileError(compiled.errors.join("; ")))
                }
            }
        }
    }

    // ── Preview ──────────────────────────────────────────────────────

    /// Starts the debounced preview. Must be called inside a tokio runtime.
    /// Returns a receiver of compile results.
    pub fn start_preview(&mut self) -> watch::Receiver<Option<Arc<CompileResult>>> {
        let preview = self
            .preview
            .get_or_insert_with(|| PreviewDebouncer::from_settings(&self.settings, Arc::clone(&self.model)));
        preview.subscribe()
    }

    /// The latest preview result, if the preview is running and has compiled.
    pub fn preview(&self) -> Option<Arc<CompileResult>> {
        self.preview.as_ref().and_then(PreviewDebouncer::latest)
    }

    // ── Parameters ───────────────────────────────────────────────────

    /// Re-derives parameters from the live SQL, keeping user overrides.
    pub fn refresh_parameters(&mut self) {
        self.parameters = reextract(&self.current_sql(), &self.parameters);
    }

    /// The current parameters.
    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    fn parameter_mut(&mut self, name: &str) -> QueryCraftResult<&mut ParameterDescriptor> {
        self.parameters
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| QueryCraftError::TemplateError(format!("no parameter named '{name}'")))
    }

    /// Overrides a parameter's inferred type.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::TemplateError`] for an unknown name.
    pub fn set_parameter_type(&mut self, name: &str, param_type: ValueType) -> QueryCraftResult<()> {
        let parameter = self.parameter_mut(name)?;
        parameter.param_type = param_type;
        parameter.type_locked = true;
        Ok(())
    }

    /// Marks a parameter required or optional with a default.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::TemplateError`] for an unknown name.
    pub fn set_parameter_required(
        &mut self,
        name: &str,
        required: bool,
        default_value: Option<Value>,
    ) -> QueryCraftResult<()> {
        let parameter = self.parameter_mut(name)?;
        parameter.required = required;
        parameter.default_value = default_value;
        Ok(())
    }

    /// Supplies a parameter value.
    pub fn set_value(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Withdraws a parameter value.
    pub fn clear_value(&mut self, name: &str) {
        self.values.remove(name);
    }

    /// Validates the supplied values against the current parameters.
    pub fn validate(&self) -> ValidationReport {
        self.binder.validate_all(&self.parameters, &self.values)
    }

    // ── Execution ────────────────────────────────────────────────────

    /// Compiles, validates and submits the live query.
    ///
    /// Parameters are re-extracted from the SQL being submitted, so the
    /// bound set always matches the text.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::CompileError`] for SQL that does not
    /// compile, [`QueryCraftError::ValidationError`] for bad values, or the
    /// execution service's error.
    pub async fn execute(&mut self) -> QueryCraftResult<QueryHandle> {
        let request = {
            let span = self.span.clone();
            let _entered = span.enter();
            let sql = self.executable_sql()?;
            self.parameters = reextract(&sql, &self.parameters);
            let bound = self.binder.bind(&self.parameters, &self.values)?;
            ExecutionRequest {
                data_source_id: self.settings.data_source_id.clone(),
                sql,
                parameters: bound,
                page_size: self.settings.execution.page_size,
                timeout_ms: self.settings.execution.timeout_ms,
            }
        };
        let parameters = request.parameters.len();
        let handle = self
            .services
            .execution
            .submit(request)
            .instrument(self.span.clone())
            .await?;
        self.span
            .in_scope(|| info!(%handle, parameters, "query submitted"));
        Ok(handle)
    }

    /// Submits the live query and polls until it finishes.
    ///
    /// # Errors
    ///
    /// Returns the submission error, [`QueryCraftError::Timeout`] when the
    /// poll bound is exceeded, or [`QueryCraftError::ServiceError`] when the
    /// query finished with an error.
    pub async fn execute_and_wait(&mut self) -> QueryCraftResult<ExecutionStatus> {
        let handle = self.execute().await?;
        ExecutionPoller::from_settings(&self.settings.execution)
            .spawn(Arc::clone(&self.services.execution), handle)
            .join()
            .instrument(self.span.clone())
            .await?
            .into_result()
    }

    // ── Templates ────────────────────────────────────────────────────

    /// Builds a template from the live SQL.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::CompileError`] when the model does not
    /// compile.
    pub fn to_template(&self) -> QueryCraftResult<QueryTemplate> {
        let template = match &self.raw_sql {
            Some(sql) => QueryTemplate::from_source(TemplateSource::Sql(sql), &self.compiler)?,
            None => QueryTemplate::from_source(TemplateSource::Model(&self.model), &self.compiler)?,
        };
        // Carry the session's parameter overrides into the saved contract.
        Ok(QueryTemplate {
            parameters: reextract(&template.sql, &self.parameters),
            sql: template.sql,
        })
    }

    /// Saves the live SQL as a named template.
    ///
    /// # Errors
    ///
    /// Returns a compile error or the template store's error.
    pub async fn save_template(
        &self,
        name: &str,
        description: &str,
        tags: Vec<String>,
        is_public: bool,
    ) -> QueryCraftResult<Uuid> {
        let mut record = TemplateRecord::from_template(name, self.to_template()?);
        record.description = description.to_string();
        record.tags = tags;
        record.is_public = is_public;
        let id = self
            .services
            .templates
            .create(record)
            .instrument(self.span.clone())
            .await?;
        self.span.in_scope(|| info!(template = %id, name, "template saved"));
        Ok(id)
    }

    /// Loads a saved template as hand-written SQL.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::TemplateError`] for an unknown id, or the
    /// template store's error.
    pub async fn load_template(&mut self, id: Uuid) -> QueryCraftResult<()> {
        let record = self
            .services
            .templates
            .get(id)
            .instrument(self.span.clone())
            .await?
            .ok_or_else(|| QueryCraftError::TemplateError(format!("no template with id {id}")))?;
        let template = record.template();
        self.raw_sql = Some(template.sql);
        self.parameters = template.parameters;
        Ok(())
    }

    // ── Recovery snapshots ───────────────────────────────────────────

    /// Serializes the model for local recovery storage.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::SerializationError`] if encoding fails.
    pub fn snapshot(&self) -> QueryCraftResult<String> {
        self.model.snapshot()
    }

    /// Replaces the model with a recovery snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::SerializationError`] for malformed JSON and
    /// [`QueryCraftError::UnknownTable`] for a snapshot that refers to a
    /// table it does not contain; the model is unchanged either way.
    pub fn restore(&mut self, json: &str) -> QueryCraftResult<()> {
        let restored = QueryModel::restore(json)?;
        self.edit(|model| {
            *model = restored;
            Ok(())
        })
    }
}
