//! The query model: selected tables, joins, conditions, grouping, ordering
//! and paging.
//!
//! [`QueryModel`] is created empty when a builder session starts and is
//! mutated in place by the operations below. Every operation either fully
//! applies or returns an error without touching the model. Removing a table
//! cascades to every join, condition leaf, group-by and order-by entry that
//! references it, so a serialized model never holds a dangling table id.
//!
//! Join operations and the relationship suggestion flow live in
//! [`joins`](super::joins).

use std::collections::HashSet;
use std::fmt;

use querycraft_core::{QueryCraftError, QueryCraftResult};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::conditions::ConditionGroup;
use super::joins::JoinDescriptor;
use crate::value::ValueType;

/// Identifies a table within one query model.
///
/// Generated when the table is added and stable for the life of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(Uuid);

impl TableId {
    /// Generates a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TableId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An aggregate function applied to a selected column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Aggregate {
    /// `COUNT(col)`
    Count,
    /// `SUM(col)`
    Sum,
    /// `AVG(col)`
    Avg,
    /// `MAX(col)`
    Max,
    /// `MIN(col)`
    Min,
}

impl Aggregate {
    /// Returns the SQL function name.
    pub const fn sql_name(&self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Max => "MAX",
            Self::Min => "MIN",
        }
    }
}

/// A column of a selected table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSelection {
    /// The column name.
    pub name: String,
    /// The canonical type inferred from the source column type.
    pub declared_type: ValueType,
    /// Whether the column appears in the SELECT list.
    #[serde(default)]
    pub selected: bool,
    /// The aggregate wrapped around the column, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<Aggregate>,
}

impl ColumnSelection {
    /// Creates an unselected column.
    pub fn new(name: impl Into<String>, declared_type: ValueType) -> Self {
        Self {
            name: name.into(),
            declared_type,
            selected: false,
            aggregate: None,
        }
    }
}

/// A table added to the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSelection {
    /// The table's id within the model.
    pub id: TableId,
    /// The schema the table lives in. Empty for the default schema.
    #[serde(default)]
    pub schema_name: String,
    /// The table name.
    pub table_name: String,
    /// An optional alias used to qualify the table's columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// The table's columns, in source order.
    #[serde(default)]
    pub columns: Vec<ColumnSelection>,
}

impl TableSelection {
    /// Creates a table selection with a fresh id and no columns.
    pub fn new(schema_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            id: TableId::new(),
            schema_name: schema_name.into(),
            table_name: table_name.into(),
            alias: None,
            columns: Vec::new(),
        }
    }

    /// Adds an unselected column.
    pub fn with_column(mut self, name: impl Into<String>, declared_type: ValueType) -> Self {
        self.columns.push(ColumnSelection::new(name, declared_type));
        self
    }

    /// Sets the alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The name columns of this table are qualified with: the alias if set,
    /// otherwise the table name.
    pub fn qualifier(&self) -> &str {
        self.alias
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(&self.table_name)
    }

    /// The table name qualified by its schema, when one is set.
    pub fn qualified_name(&self) -> String {
        if self.schema_name.trim().is_empty() {
            self.table_name.clone()
        } else {
            format!("{}.{}", self.schema_name, self.table_name)
        }
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnSelection> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn column_mut(&mut self, name: &str) -> QueryCraftResult<&mut ColumnSelection> {
        let table = self.table_name.clone();
        self.columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| QueryCraftError::UnknownColumn(format!("{table}.{name}")))
    }
}

/// A reference to one column of one selected table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnRef {
    /// The owning table.
    pub table_id: TableId,
    /// The column name.
    pub name: String,
    /// The column's canonical type.
    pub declared_type: ValueType,
}

/// Sort direction for an ORDER BY entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortDirection {
    /// Returns the SQL keyword.
    pub const fn sql_keyword(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One ORDER BY entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// The column to sort by.
    pub column: ColumnRef,
    /// The sort direction.
    #[serde(default)]
    pub direction: SortDirection,
}

/// The complete structured representation of a visually built query.
///
/// # Examples
///
/// ```
/// use querycraft_builder::query::{QueryModel, TableSelection};
/// use querycraft_builder::value::ValueType;
///
/// let mut model = QueryModel::new();
/// let users = model.add_table(
///     TableSelection::new("public", "users").with_column("id", ValueType::Number),
/// );
/// model.toggle_column(users, "id").unwrap();
/// assert_eq!(model.tables.len(), 1);
///
/// model.remove_table(users).unwrap();
/// assert!(model.tables.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryModel {
    /// Selected tables. The first one is the FROM table.
    pub tables: Vec<TableSelection>,
    /// Joins, in insertion order.
    pub joins: Vec<JoinDescriptor>,
    /// The root of the filter tree.
    pub conditions: ConditionGroup,
    /// GROUP BY columns.
    pub group_by: Vec<ColumnRef>,
    /// ORDER BY entries.
    pub order_by: Vec<OrderBy>,
    /// Row limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Row offset; only emitted together with a limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

impl QueryModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no table has been added.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    // ── Tables ───────────────────────────────────────────────────────

    /// Adds a table and returns its id.
    pub fn add_table(&mut self, table: TableSelection) -> TableId {
        let id = table.id;
        debug!(table = %table.qualified_name(), %id, "table added");
        self.tables.push(table);
        id
    }

    /// Looks up a table by id.
    pub fn table(&self, id: TableId) -> Option<&TableSelection> {
        self.tables.iter().find(|t| t.id == id)
    }

    /// Looks up a table by id, failing with `UnknownTable`.
    pub fn require_table(&self, id: TableId) -> QueryCraftResult<&TableSelection> {
        self.table(id)
            .ok_or_else(|| QueryCraftError::UnknownTable(id.to_string()))
    }

    fn table_mut(&mut self, id: TableId) -> QueryCraftResult<&mut TableSelection> {
        self.tables
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| QueryCraftError::UnknownTable(id.to_string()))
    }

    /// Removes a table together with every join, condition leaf, group-by
    /// and order-by entry that references it.
    pub fn remove_table(&mut self, id: TableId) -> QueryCraftResult<TableSelection> {
        let index = self
            .tables
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| QueryCraftError::UnknownTable(id.to_string()))?;
        let removed = self.tables.remove(index);
        let joins_before = self.joins.len();
        self.joins.retain(|j| !j.touches(id));
        self.conditions = self.conditions.retain_leaves(|leaf| !leaf.references(id));
        self.group_by.retain(|c| c.table_id != id);
        self.order_by.retain(|o| o.column.table_id != id);
        debug!(
            table = %removed.qualified_name(),
            joins_removed = joins_before - self.joins.len(),
            "table removed"
        );
        Ok(removed)
    }

    /// Returns `true` if any part of the model refers to `id`.
    pub fn references_table(&self, id: TableId) -> bool {
        self.tables.iter().any(|t| t.id == id)
            || self.joins.iter().any(|j| j.touches(id))
            || self.conditions.leaves().iter().any(|l| l.references(id))
            || self.group_by.iter().any(|c| c.table_id == id)
            || self.order_by.iter().any(|o| o.column.table_id == id)
    }

    /// Sets or clears a table's alias.
    pub fn set_alias(&mut self, id: TableId, alias: Option<String>) -> QueryCraftResult<()> {
        self.table_mut(id)?.alias = alias.filter(|a| !a.trim().is_empty());
        Ok(())
    }

    // ── Columns ──────────────────────────────────────────────────────

    /// Flips a column's `selected` flag and returns the new state.
    pub fn toggle_column(&mut self, table_id: TableId, column: &str) -> QueryCraftResult<bool> {
        let col = self.table_mut(table_id)?.column_mut(column)?;
        col.selected = !col.selected;
        Ok(col.selected)
    }

    /// Sets or clears a column's aggregate. Setting one also selects the column.
    pub fn set_aggregate(
        &mut self,
        table_id: TableId,
        column: &str,
        aggregate: Option<Aggregate>,
    ) -> QueryCraftResult<()> {
        let col = self.table_mut(table_id)?.column_mut(column)?;
        if aggregate.is_some() {
            col.selected = true;
        }
        col.aggregate = aggregate;
        Ok(())
    }

    /// Builds a reference to an existing column.
    pub fn column_ref(&self, table_id: TableId, column: &str) -> QueryCraftResult<ColumnRef> {
        let table = self.require_table(table_id)?;
        let col = table.column(column).ok_or_else(|| {
            QueryCraftError::UnknownColumn(format!("{}.{column}", table.table_name))
        })?;
        Ok(ColumnRef {
            table_id,
            name: col.name.clone(),
            declared_type: col.declared_type,
        })
    }

    fn check_column_ref(&self, column: &ColumnRef) -> QueryCraftResult<()> {
        self.column_ref(column.table_id, &column.name).map(|_| ())
    }

    // ── Grouping and ordering ────────────────────────────────────────

    /// Appends a GROUP BY column. Adding the same column twice is a no-op.
    pub fn add_group_by(&mut self, column: ColumnRef) -> QueryCraftResult<()> {
        self.check_column_ref(&column)?;
        if !self.group_by.contains(&column) {
            self.group_by.push(column);
        }
        Ok(())
    }

    /// Removes the GROUP BY entry at `index`.
    pub fn remove_group_by(&mut self, index: usize) -> QueryCraftResult<ColumnRef> {
        if index >= self.group_by.len() {
            return Err(QueryCraftError::UnknownColumn(format!("group-by entry {index}")));
        }
        Ok(self.group_by.remove(index))
    }

    /// Appends an ORDER BY entry, or changes the direction of an existing
    /// entry for the same column.
    pub fn add_order_by(
        &mut self,
        column: ColumnRef,
        direction: SortDirection,
    ) -> QueryCraftResult<()> {
        self.check_column_ref(&column)?;
        if let Some(existing) = self.order_by.iter_mut().find(|o| o.column == column) {
            existing.direction = direction;
        } else {
            self.order_by.push(OrderBy { column, direction });
        }
        Ok(())
    }

    /// Removes the ORDER BY entry at `index`.
    pub fn remove_order_by(&mut self, index: usize) -> QueryCraftResult<OrderBy> {
        if index >= self.order_by.len() {
            return Err(QueryCraftError::UnknownColumn(format!("order-by entry {index}")));
        }
        Ok(self.order_by.remove(index))
    }

    // ── Paging ───────────────────────────────────────────────────────

    /// Sets or clears the row limit.
    pub fn set_limit(&mut self, limit: Option<u64>) {
        self.limit = limit;
    }

    /// Sets or clears the row offset.
    pub fn set_offset(&mut self, offset: Option<u64>) {
        self.offset = offset;
    }

    // ── Conditions ───────────────────────────────────────────────────

    /// Replaces the condition tree.
    pub fn set_conditions(&mut self, conditions: ConditionGroup) {
        self.conditions = conditions;
    }

    /// Replaces the condition tree with the result of `edit`. The model is
    /// left untouched when `edit` fails.
    pub fn update_conditions<F>(&mut self, edit: F) -> QueryCraftResult<()>
    where
        F: FnOnce(&ConditionGroup) -> QueryCraftResult<ConditionGroup>,
    {
        self.conditions = edit(&self.conditions)?;
        Ok(())
    }

    // ── Snapshots ────────────────────────────────────────────────────

    /// Serializes the model to JSON for local recovery storage.
    pub fn snapshot(&self) -> QueryCraftResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Restores a model from a JSON snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::SerializationError`] for malformed JSON or
    /// a table or join id listed twice, and [`QueryCraftError::UnknownTable`]
    /// when a join, condition, grouping or ordering names a table the
    /// snapshot does not contain.
    pub fn restore(json: &str) -> QueryCraftResult<Self> {
        let model: Self = serde_json::from_str(json)?;
        model.check_references()?;
        Ok(model)
    }

    fn check_references(&self) -> QueryCraftResult<()> {
        let mut tables = HashSet::new();
        if let Some(table) = self.tables.iter().find(|t| !tables.insert(t.id)) {
            return Err(QueryCraftError::SerializationError(format!(
                "snapshot lists table {} twice",
                table.id
            )));
        }
        let mut joins = HashSet::new();
        if let Some(join) = self.joins.iter().find(|j| !joins.insert(j.id)) {
            return Err(QueryCraftError::SerializationError(format!(
                "snapshot lists join {} twice",
                join.id
            )));
        }

        let referenced = self
            .joins
            .iter()
            .flat_map(|j| [j.left_table_id, j.right_table_id])
            .chain(self.conditions.leaves().into_iter().map(|l| l.table_id))
            .flatten()
            .chain(self.group_by.iter().map(|c| c.table_id))
            .chain(self.order_by.iter().map(|o| o.column.table_id));
        for id in referenced {
            if !tables.contains(&id) {
                return Err(QueryCraftError::UnknownTable(id.to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Operator;
    use crate::query::conditions::ConditionLeaf;
    use crate::value::Value;

    fn users() -> TableSelection {
        TableSelection::new("public", "users")
            .with_column("id", ValueType::Number)
            .with_column("email", ValueType::String)
    }

    fn orders() -> TableSelection {
        TableSelection::new("public", "orders")
            .with_column("id", ValueType::Number)
            .with_column("user_id", ValueType::Number)
    }

    // ── Tables ──────────────────────────────────────────────────────

    #[test]
    fn test_table_ids_are_unique() {
        let mut model = QueryModel::new();
        let a = model.add_table(users());
        let b = model.add_table(users());
        assert_ne!(a, b);
    }

    #[test]
    fn test_qualifier_and_qualified_name() {
        let t = users();
        assert_eq!(t.qualifier(), "users");
        assert_eq!(t.qualified_name(), "public.users");
        let t = t.with_alias("u");
        assert_eq!(t.qualifier(), "u");
        let bare = TableSelection::new("", "users");
        assert_eq!(bare.qualified_name(), "users");
    }

    #[test]
    fn test_remove_unknown_table() {
        let mut model = QueryModel::new();
        assert!(matches!(
            model.remove_table(TableId::new()),
            Err(QueryCraftError::UnknownTable(_))
        ));
    }

    #[test]
    fn test_remove_table_cascades() {
        let mut model = QueryModel::new();
        let u = model.add_table(users());
        let o = model.add_table(orders());
        let join = model.add_join();
        model.set_join_tables(join, u, o).unwrap();
        model.set_conditions(ConditionGroup::and([
            ConditionLeaf::compare("user_id", Operator::Gt, Value::from(1)).on(o),
            ConditionLeaf::compare("email", Operator::Like, Value::from("%@x")).on(u),
        ]));
        model.add_group_by(model.column_ref(o, "user_id").unwrap()).unwrap();
        model
            .add_order_by(model.column_ref(o, "id").unwrap(), SortDirection::Desc)
            .unwrap();

        model.remove_table(o).unwrap();

        assert!(!model.references_table(o));
        assert!(model.joins.is_empty());
        assert_eq!(model.conditions.leaf_count(), 1);
        assert!(model.group_by.is_empty());
        assert!(model.order_by.is_empty());
        assert!(model.references_table(u));
    }

    // ── Columns ─────────────────────────────────────────────────────

    #[test]
    fn test_toggle_column() {
        let mut model = QueryModel::new();
        let u = model.add_table(users());
        assert!(model.toggle_column(u, "email").unwrap());
        assert!(!model.toggle_column(u, "email").unwrap());
        assert!(matches!(
            model.toggle_column(u, "missing"),
            Err(QueryCraftError::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_set_aggregate_selects_column() {
        let mut model = QueryModel::new();
        let u = model.add_table(users());
        model.set_aggregate(u, "id", Some(Aggregate::Count)).unwrap();
        let col = model.table(u).unwrap().column("id").unwrap();
        assert!(col.selected);
        assert_eq!(col.aggregate, Some(Aggregate::Count));
    }

    // ── Grouping and ordering ───────────────────────────────────────

    #[test]
    fn test_group_by_dedup() {
        let mut model = QueryModel::new();
        let u = model.add_table(users());
        let col = model.column_ref(u, "email").unwrap();
        model.add_group_by(col.clone()).unwrap();
        model.add_group_by(col).unwrap();
        assert_eq!(model.group_by.len(), 1);
        model.remove_group_by(0).unwrap();
        assert!(model.remove_group_by(0).is_err());
    }

    #[test]
    fn test_order_by_updates_direction() {
        let mut model = QueryModel::new();
        let u = model.add_table(users());
        let col = model.column_ref(u, "id").unwrap();
        model.add_order_by(col.clone(), SortDirection::Asc).unwrap();
        model.add_order_by(col, SortDirection::Desc).unwrap();
        assert_eq!(model.order_by.len(), 1);
        assert_eq!(model.order_by[0].direction, SortDirection::Desc);
    }

    #[test]
    fn test_group_by_rejects_dangling_column() {
        let mut model = QueryModel::new();
        let col = ColumnRef {
            table_id: TableId::new(),
            name: "id".into(),
            declared_type: ValueType::Number,
        };
        assert!(model.add_group_by(col).is_err());
    }

    // ── Conditions ──────────────────────────────────────────────────

    #[test]
    fn test_failed_condition_edit_leaves_model_intact() {
        let mut model = QueryModel::new();
        model.set_conditions(ConditionGroup::default().add_leaf());
        let before = model.clone();
        assert!(model.update_conditions(|c| c.remove_at(5)).is_err());
        assert_eq!(model, before);
    }

    // ── Snapshots ───────────────────────────────────────────────────

    #[test]
    fn test_snapshot_restore() {
        let mut model = QueryModel::new();
        let u = model.add_table(users().with_alias("u"));
        model.toggle_column(u, "email").unwrap();
        model.set_limit(Some(10));
        model.set_conditions(ConditionGroup::and([
            ConditionLeaf::compare("email", Operator::Ne, Value::from("")).on(u),
        ]));
        let json = model.snapshot().unwrap();
        assert!(json.contains("\"tableName\":\"users\""));
        let restored = QueryModel::restore(&json).unwrap();
        assert_eq!(restored, model);
    }

    #[test]
    fn test_restore_rejects_garbage() {
        assert!(matches!(
            QueryModel::restore("{not json"),
            Err(QueryCraftError::SerializationError(_))
        ));
    }

    #[test]
    fn test_restore_rejects_dangling_table_reference() {
        let mut model = QueryModel::new();
        let u = model.add_table(users());
        let o = model.add_table(orders());
        let join = model.add_join();
        model.set_join_tables(join, u, o).unwrap();
        let mut json: serde_json::Value = serde_json::from_str(&model.snapshot().unwrap()).unwrap();
        json["tables"].as_array_mut().unwrap().remove(1);

        let err = QueryModel::restore(&json.to_string()).unwrap_err();
        assert!(matches!(err, QueryCraftError::UnknownTable(id) if id == o.to_string()));
    }

    #[test]
    fn test_restore_rejects_dangling_order_by() {
        let mut model = QueryModel::new();
        let u = model.add_table(users());
        model
            .add_order_by(model.column_ref(u, "id").unwrap(), SortDirection::Asc)
            .unwrap();
        let mut json: serde_json::Value = serde_json::from_str(&model.snapshot().unwrap()).unwrap();
        json["tables"] = serde_json::json!([]);
        assert!(matches!(
            QueryModel::restore(&json.to_string()),
            Err(QueryCraftError::UnknownTable(_))
        ));
    }

    #[test]
    fn test_restore_rejects_duplicate_table_ids() {
        let mut model = QueryModel::new();
        model.add_table(users());
        let mut json: serde_json::Value = serde_json::from_str(&model.snapshot().unwrap()).unwrap();
        let tables = json["tables"].as_array_mut().unwrap();
        let copy = tables[0].clone();
        tables.push(copy);
        assert!(matches!(
            QueryModel::restore(&json.to_string()),
            Err(QueryCraftError::SerializationError(m)) if m.contains("twice")
        ));
    }

    #[test]
    fn test_restore_fills_defaults() {
        let model = QueryModel::restore("{}").unwrap();
        assert!(model.is_empty());
        assert!(model.conditions.is_empty());
        assert_eq!(model.limit, None);
    }
}
