//! SQL compiler.
//!
//! [`SqlCompiler::compile`] turns a [`QueryModel`] into SQL text plus
//! diagnostics. Compilation is deterministic and never fails: structural
//! problems (no tables, an incomplete join, a condition without a column)
//! are collected in [`CompileResult::errors`] and mark the result invalid,
//! while suspicious-but-legal shapes such as a Cartesian product are
//! reported as warnings.
//!
//! Clauses are emitted in a fixed order, one per line:
//!
//! ```text
//! SELECT ... FROM ...
//! <KIND> JOIN ... ON ...
//! WHERE ...
//! GROUP BY ...
//! ORDER BY ...
//! LIMIT n
//! OFFSET m
//! ```

use std::collections::{HashMap, HashSet};

use querycraft_core::{CompilerSettings, DuplicateJoinPolicy, LiteralPolicy};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::conditions::{ConditionGroup, ConditionLeaf, ConditionNode, Logic};
use super::joins::JoinDescriptor;
use super::literal::{render_text, render_value};
use super::model::{ColumnRef, QueryModel, TableId, TableSelection};
use crate::catalog::Arity;
use crate::value::{ConditionValue, Value};

/// The output of one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResult {
    /// The SQL text. Empty when no table is selected.
    pub sql: String,
    /// `true` when `errors` is empty and the SQL may be executed.
    pub valid: bool,
    /// Structural problems that block execution.
    pub errors: Vec<String>,
    /// Advisory diagnostics.
    pub warnings: Vec<String>,
}

/// Compiles query models into SQL text.
///
/// # Examples
///
/// ```
/// use querycraft_builder::query::{QueryModel, SqlCompiler, TableSelection};
/// use querycraft_core::CompilerSettings;
///
/// let mut model = QueryModel::new();
/// model.add_table(TableSelection::new("", "users"));
/// model.set_limit(Some(10));
///
/// let result = SqlCompiler::new(CompilerSettings::default()).compile(&model);
/// assert!(result.valid);
/// assert_eq!(result.sql, "SELECT * FROM users\nLIMIT 10");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SqlCompiler {
    settings: CompilerSettings,
}

/// Diagnostics and lookups shared by the clause renderers.
struct Context<'a> {
    tables: HashMap<TableId, &'a TableSelection>,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl<'a> Context<'a> {
    fn new(model: &'a QueryModel) -> Self {
        Self {
            tables: model.tables.iter().map(|t| (t.id, t)).collect(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn table(&self, id: TableId) -> Option<&'a TableSelection> {
        self.tables.get(&id).copied()
    }

    fn qualified_column(&mut self, column: &ColumnRef, clause: &str) -> Option<String> {
        if let Some(table) = self.table(column.table_id) {
            Some(format!("{}.{}", table.qualifier(), column.name))
        } else {
            self.errors.push(format!(
                "{clause} column '{}' references a table that is not selected",
                column.name
            ));
            None
        }
    }
}

/// A rendered join line.
enum JoinClause<'a> {
    On {
        keyword: &'static str,
        table: String,
        predicates: Vec<String>,
    },
    Cross(&'a TableSelection),
}

impl JoinClause<'_> {
    fn render(&self) -> String {
        match self {
            Self::On {
                keyword,
                table,
                predicates,
            } => format!("{keyword} {table} ON {} ", predicates.join(" AND ")),
            Self::Cross(table) => format!("CROSS JOIN {}", table_reference(table)),
        }
    }
}

/// A unit of work for the iterative WHERE renderer.
enum Task<'a> {
    Visit(&'a ConditionNode, bool),
    Combine {
        logic: Logic,
        children: usize,
        nested: bool,
    },
}

fn table_reference(table: &TableSelection) -> String {
    match table.alias.as_deref().filter(|a| !a.trim().is_empty()) {
        Some(alias) => format!("{} AS {alias}", table.qualified_name()),
        None => table.qualified_name(),
    }
}

impl SqlCompiler {
    /// Creates a compiler with the given settings.
    pub const fn new(settings: CompilerSettings) -> Self {
        Self { settings }
    }

    /// Returns the literal quoting policy in effect.
    pub const fn literal_policy(&self) -> LiteralPolicy {
        self.settings.literal_policy
    }

    /// Compiles `model` into SQL text and diagnostics.
    pub fn compile(&self, model: &QueryModel) -> CompileResult {
        let mut cx = Context::new(model);
        let Some(first) = model.tables.first() else {
            return CompileResult {
                sql: String::new(),
                valid: false,
                errors: vec!["no tables selected".to_string()],
                warnings: Vec::new(),
            };
        };

        let mut clauses = vec![format!(
            "{} FROM {}",
            self.compile_select(model, &mut cx),
            table_reference(first)
        )];
        clauses.extend(self.compile_joins(model, first, &mut cx));
        if let Some(predicate) = self.compile_where(&model.conditions, &mut cx) {
            clauses.push(format!("WHERE {predicate}"));
        }
        if !model.group_by.is_empty() {
            let columns: Vec<String> = model
                .group_by
                .iter()
                .filter_map(|c| cx.qualified_column(c, "GROUP BY"))
                .collect();
            if !columns.is_empty() {
                clauses.push(format!("GROUP BY {}", columns.join(", ")));
            }
        }
        if !model.order_by.is_empty() {
            let columns: Vec<String> = model
                .order_by
                .iter()
                .filter_map(|o| {
                    cx.qualified_column(&o.column, "ORDER BY")
                        .map(|c| format!("{c} {}", o.direction.sql_keyword()))
                })
                .collect();
            if !columns.is_empty() {
                clauses.push(format!("ORDER BY {}", columns.join(", ")));
            }
        }
        if let Some(limit) = model.limit {
            clauses.push(format!("LIMIT {limit}"));
            if let Some(offset) = model.offset.filter(|o| *o > 0) {
                clauses.push(format!("OFFSET {offset}"));
            }
        }

        let Context {
            errors, warnings, ..
        } = cx;
        debug!(
            errors = errors.len(),
            warnings = warnings.len(),
            "query compiled"
        );
        CompileResult {
            sql: clauses.join("\n"),
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    // ── SELECT ───────────────────────────────────────────────────────

    fn compile_select(&self, model: &QueryModel, cx: &mut Context<'_>) -> String {
        let mut columns = Vec::new();
        let mut plain = Vec::new();
        let mut aggregated = false;
        for table in &model.tables {
            for column in table.columns.iter().filter(|c| c.selected) {
                let qualified = format!("{}.{}", table.qualifier(), column.name);
                match column.aggregate {
                    Some(aggregate) => {
                        aggregated = true;
                        columns.push(format!("{}({qualified})", aggregate.sql_name()));
                    }
                    None => {
                        let grouped = model
                            .group_by
                            .iter()
                            .any(|g| g.table_id == table.id && g.name == column.name);
                        if !grouped {
                            plain.push(qualified.clone());
                        }
                        columns.push(qualified);
                    }
                }
            }
        }
        if aggregated {
            for column in plain {
                cx.warnings.push(format!(
                    "column '{column}' is selected alongside aggregates but is not grouped"
                ));
            }
        }
        if columns.is_empty() {
            "SELECT *".to_string()
        } else {
            format!("SELECT {}", columns.join(", "))
        }
    }

    // ── FROM / JOIN ──────────────────────────────────────────────────

    /// Renders one line per join.
    ///
    /// Lines come out in dependency order rather than insertion order: a join
    /// touching no table in scope yet waits until one of its tables is
    /// brought in. When it is the join's right table that is already in
    /// scope, the left table is the one joined and LEFT/RIGHT are mirrored.
    /// A join whose tables are both in scope adds its predicate to the later
    /// of the two clauses that introduced them, so every ON clause only names
    /// tables joined above it. Tables nothing connects are cross-joined with
    /// a Cartesian-product warning.
    fn compile_joins<'a>(
        &self,
        model: &'a QueryModel,
        first: &'a TableSelection,
        cx: &mut Context<'a>,
    ) -> Vec<String> {
        let mut pending = self.checked_joins(model, cx);
        let mut clauses: Vec<JoinClause<'a>> = Vec::new();
        // The FROM table is in scope without a clause of its own.
        let mut introduced_by: HashMap<TableId, Option<usize>> = HashMap::from([(first.id, None)]);

        while !pending.is_empty() {
            let ready = pending.iter().position(|(_, left, right)| {
                introduced_by.contains_key(&left.id) || introduced_by.contains_key(&right.id)
            });
            let Some(index) = ready else {
                let (_, left, _) = pending[0];
                introduced_by.insert(left.id, Some(clauses.len()));
                clauses.push(JoinClause::Cross(left));
                continue;
            };
            let (join, left, right) = pending.remove(index);
            let predicate = format!(
                "{}.{} = {}.{}",
                left.qualifier(),
                join.left_column.as_deref().unwrap_or_default(),
                right.qualifier(),
                join.right_column.as_deref().unwrap_or_default(),
            );
            let scope = (introduced_by.get(&left.id), introduced_by.get(&right.id));
            let (joined, keyword) = match scope {
                (Some(&l), Some(&r)) => {
                    // Never a CROSS clause: it precedes every other table of
                    // its component.
                    let target = l.max(r).and_then(|t| clauses.get_mut(t));
                    if let Some(JoinClause::On { predicates, .. }) = target {
                        predicates.push(predicate);
                    }
                    continue;
                }
                (Some(_), None) => (right, join.kind.sql_keyword()),
                _ => (left, join.kind.mirrored().sql_keyword()),
            };
            introduced_by.insert(joined.id, Some(clauses.len()));
            clauses.push(JoinClause::On {
                keyword,
                table: table_reference(joined),
                predicates: vec![predicate],
            });
        }

        for table in model.tables.iter().skip(1) {
            if !introduced_by.contains_key(&table.id) {
                clauses.push(JoinClause::Cross(table));
            }
        }
        for clause in &clauses {
            if let JoinClause::Cross(table) = clause {
                cx.warnings.push(cartesian_warning(table));
            }
        }
        clauses.iter().map(JoinClause::render).collect()
    }

    /// Filters the join list down to complete, well-formed joins, reporting
    /// the rest, and applies the duplicate-pair policy.
    fn checked_joins<'a>(
        &self,
        model: &'a QueryModel,
        cx: &mut Context<'a>,
    ) -> Vec<(&'a JoinDescriptor, &'a TableSelection, &'a TableSelection)> {
        let mut checked = Vec::new();
        let mut pairs = HashSet::new();
        for (position, join) in model.joins.iter().enumerate() {
            let number = position + 1;
            if !join.is_complete() {
                cx.errors.push(format!(
                    "join {number} is incomplete: choose both tables and both columns"
                ));
                continue;
            }
            let Some((left_id, right_id)) = join.endpoints() else {
                continue;
            };
            if left_id == right_id {
                cx.errors
                    .push(format!("join {number} joins a table to itself"));
                continue;
            }
            let (Some(left), Some(right)) = (cx.table(left_id), cx.table(right_id)) else {
                cx.errors.push(format!(
                    "join {number} references a table that is not selected"
                ));
                continue;
            };
            let pair = if left_id < right_id {
                (left_id, right_id)
            } else {
                (right_id, left_id)
            };
            if !pairs.insert(pair) {
                let message = format!(
                    "join {number} repeats the table pair {} / {}",
                    left.table_name, right.table_name
                );
                match self.settings.duplicate_joins {
                    DuplicateJoinPolicy::Allow => {}
                    DuplicateJoinPolicy::Warn => cx.warnings.push(message),
                    DuplicateJoinPolicy::Reject => {
                        cx.errors.push(message);
                        continue;
                    }
                }
            }
            checked.push((join, left, right));
        }
        checked
    }

    // ── WHERE ────────────────────────────────────────────────────────

    /// Renders the condition tree with an explicit stack. Root children are
    /// joined without parentheses; a nested group with more than one
    /// rendered child is parenthesized; empty groups contribute nothing.
    fn compile_where(&self, root: &ConditionGroup, cx: &mut Context<'_>) -> Option<String> {
        let mut tasks = vec![Task::Combine {
            logic: root.logic,
            children: root.conditions.len(),
            nested: false,
        }];
        tasks.extend(root.conditions.iter().rev().map(|c| Task::Visit(c.as_ref(), true)));
        let mut rendered: Vec<Option<String>> = Vec::new();

        while let Some(task) = tasks.pop() {
            match task {
                Task::Visit(ConditionNode::Leaf(leaf), _) => {
                    rendered.push(self.compile_leaf(leaf, cx));
                }
                Task::Visit(ConditionNode::Group(group), nested) => {
                    tasks.push(Task::Combine {
                        logic: group.logic,
                        children: group.conditions.len(),
                        nested,
                    });
                    tasks.extend(group.conditions.iter().rev().map(|c| Task::Visit(c.as_ref(), true)));
                }
                Task::Combine {
                    logic,
                    children,
                    nested,
                } => {
                    let parts: Vec<String> = rendered
                        .split_off(rendered.len() - children)
                        .into_iter()
                        .flatten()
                        .collect();
                    let combined = match parts.len() {
                        0 => None,
                        1 => parts.into_iter().next(),
                        _ => {
                            let joined = parts.join(&format!(" {} ", logic.sql_keyword()));
                            Some(if nested { format!("({joined})") } else { joined })
                        }
                    };
                    rendered.push(combined);
                }
            }
        }
        rendered.pop().flatten()
    }

    fn compile_leaf(&self, leaf: &ConditionLeaf, cx: &mut Context<'_>) -> Option<String> {
        if !leaf.is_bound() {
            cx.errors.push("a condition has no column selected".to_string());
            return None;
        }
        let column = match leaf.table_id {
            None => leaf.column.clone(),
            Some(id) => {
                let Some(table) = cx.table(id) else {
                    cx.errors.push(format!(
                        "condition on '{}' references a table that is not selected",
                        leaf.column
                    ));
                    return None;
                };
                format!("{}.{}", table.qualifier(), leaf.column)
            }
        };
        let operator = leaf.operator;
        let policy = self.settings.literal_policy;
        match operator.arity() {
            Arity::None => Some(format!("{column} {operator}")),
            Arity::List => {
                let items = list_items(&leaf.value, policy);
                if items.is_empty() {
                    cx.errors
                        .push(format!("{operator} list for '{}' is empty", leaf.column));
                    None
                } else {
                    Some(format!("{column} {operator} ({})", items.join(", ")))
                }
            }
            Arity::Range => {
                if let Some((low, high)) = range_bounds(&leaf.value, policy) {
                    Some(format!("{column} {operator} {low} AND {high}"))
                } else {
                    cx.errors.push(format!(
                        "{operator} on '{}' needs a lower and an upper bound",
                        leaf.column
                    ));
                    None
                }
            }
            Arity::Single => {
                if let ConditionValue::Scalar(value) = &leaf.value {
                    Some(format!("{column} {operator} {}", render_value(value, policy)))
                } else {
                    cx.errors.push(format!(
                        "{operator} on '{}' expects a single value",
                        leaf.column
                    ));
                    None
                }
            }
        }
    }
}

fn cartesian_warning(table: &TableSelection) -> String {
    format!(
        "table '{}' is not joined to the rest of the query; this produces a Cartesian product",
        table.table_name
    )
}

fn split_text(text: &str, policy: LiteralPolicy) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| render_text(s, policy))
        .collect()
}

fn list_items(value: &ConditionValue, policy: LiteralPolicy) -> Vec<String> {
    let values: &[Value] = match value {
        ConditionValue::List(values) => values,
        ConditionValue::Scalar(Value::List(values)) => values,
        ConditionValue::Scalar(single) => std::slice::from_ref(single),
        ConditionValue::None | ConditionValue::Range(..) => &[],
    };
    values
        .iter()
        .flat_map(|v| match v {
            Value::String(s) => split_text(s, policy),
            Value::Null => Vec::new(),
            other => vec![render_value(other, policy)],
        })
        .collect()
}

fn range_bounds(value: &ConditionValue, policy: LiteralPolicy) -> Option<(String, String)> {
    let (low, high) = match value {
        ConditionValue::Range(low, high) => (low.clone(), high.clone()),
        ConditionValue::List(values) | ConditionValue::Scalar(Value::List(values))
            if values.len() == 2 =>
        {
            (values[0].clone(), values[1].clone())
        }
        ConditionValue::Scalar(Value::String(text)) => {
            let parts: Vec<&str> = text.split(',').map(str::trim).collect();
            match parts.as_slice() {
                [low, high] => (Value::from(*low), Value::from(*high)),
                _ => return None,
            }
        }
        _ => return None,
    };
    if low.is_empty() || high.is_empty() {
        return None;
    }
    Some((render_value(&low, policy), render_value(&high, policy)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Operator;
    use crate::query::joins::JoinKind;
    use crate::query::model::{Aggregate, SortDirection};
    use crate::value::ValueType;

    fn compiler() -> SqlCompiler {
        SqlCompiler::new(CompilerSettings::default())
    }

    fn users() -> TableSelection {
        TableSelection::new("", "users")
            .with_column("id", ValueType::Number)
            .with_column("name", ValueType::String)
    }

    fn orders() -> TableSelection {
        TableSelection::new("", "orders")
            .with_column("user_id", ValueType::Number)
            .with_column("total", ValueType::Number)
    }

    fn joined(model: &mut QueryModel, left: TableId, lcol: &str, right: TableId, rcol: &str) {
        let id = model.add_join();
        model.set_join_tables(id, left, right).unwrap();
        model
            .set_join_columns(id, Some(lcol.into()), Some(rcol.into()))
            .unwrap();
    }

    fn leaf(column: &str, operator: Operator, value: ConditionValue) -> ConditionLeaf {
        ConditionLeaf::new(column, operator, ValueType::String, value)
    }

    fn where_of(conditions: ConditionGroup) -> CompileResult {
        let mut model = QueryModel::new();
        model.add_table(TableSelection::new("", "t"));
        model.set_conditions(conditions);
        compiler().compile(&model)
    }

    // ── Structure ───────────────────────────────────────────────────

    #[test]
    fn test_no_tables() {
        let result = compiler().compile(&QueryModel::new());
        assert!(!result.valid);
        assert_eq!(result.sql, "");
        assert_eq!(result.errors, vec!["no tables selected"]);
    }

    #[test]
    fn test_users_orders_scenario() {
        let mut model = QueryModel::new();
        let u = model.add_table(users());
        let o = model.add_table(orders());
        joined(&mut model, u, "id", o, "user_id");
        model.set_conditions(ConditionGroup::and([ConditionLeaf::compare(
            "status",
            Operator::Eq,
            Value::from("active"),
        )]));
        model.set_limit(Some(50));
        let result = compiler().compile(&model);
        assert!(result.valid, "{:?}", result.errors);
        assert_eq!(
            result.sql,
            "SELECT * FROM users\nINNER JOIN orders ON users.id = orders.user_id \nWHERE status = 'active'\nLIMIT 50"
        );
    }

    #[test]
    fn test_select_columns_and_aggregates() {
        let mut model = QueryModel::new();
        let u = model.add_table(users().with_alias("u"));
        let o = model.add_table(orders());
        joined(&mut model, u, "id", o, "user_id");
        model.toggle_column(u, "name").unwrap();
        model.set_aggregate(o, "total", Some(Aggregate::Sum)).unwrap();
        model.add_group_by(model.column_ref(u, "name").unwrap()).unwrap();
        model
            .add_order_by(model.column_ref(u, "name").unwrap(), SortDirection::Desc)
            .unwrap();
        let result = compiler().compile(&model);
        assert!(result.valid);
        assert!(result.warnings.is_empty());
        assert_eq!(
            result.sql,
            "SELECT u.name, SUM(orders.total) FROM users AS u\nINNER JOIN orders ON u.id = orders.user_id \nGROUP BY u.name\nORDER BY u.name DESC"
        );
    }

    #[test]
    fn test_ungrouped_column_warning() {
        let mut model = QueryModel::new();
        let u = model.add_table(users());
        model.toggle_column(u, "name").unwrap();
        model.set_aggregate(u, "id", Some(Aggregate::Count)).unwrap();
        let result = compiler().compile(&model);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_schema_qualified_from() {
        let mut model = QueryModel::new();
        model.add_table(TableSelection::new("sales", "orders"));
        assert_eq!(compiler().compile(&model).sql, "SELECT * FROM sales.orders");
    }

    #[test]
    fn test_incomplete_join_is_error() {
        let mut model = QueryModel::new();
        let u = model.add_table(users());
        let o = model.add_table(orders());
        let id = model.add_join();
        model.set_join_tables(id, u, o).unwrap();
        let result = compiler().compile(&model);
        assert!(!result.valid);
        assert!(result.errors[0].contains("join 1 is incomplete"));
    }

    #[test]
    fn test_unjoined_table_warns() {
        let mut model = QueryModel::new();
        model.add_table(users());
        model.add_table(orders());
        let result = compiler().compile(&model);
        assert!(result.valid);
        assert_eq!(result.sql, "SELECT * FROM users\nCROSS JOIN orders");
        assert!(result.warnings[0].contains("Cartesian product"));
    }

    #[test]
    fn test_join_from_right_side_mirrors_kind() {
        let mut model = QueryModel::new();
        let u = model.add_table(users());
        let o = model.add_table(orders());
        let id = model.add_join();
        model.set_join_tables(id, o, u).unwrap();
        model
            .set_join_columns(id, Some("user_id".into()), Some("id".into()))
            .unwrap();
        model.set_join_kind(id, JoinKind::Left).unwrap();
        let sql = compiler().compile(&model).sql;
        assert!(sql.contains("RIGHT JOIN orders ON orders.user_id = users.id "));
    }

    #[test]
    fn test_join_waits_for_connected_table() {
        let mut model = QueryModel::new();
        let u = model.add_table(users());
        let o = model.add_table(orders());
        let p = model.add_table(TableSelection::new("", "payments").with_column("order_id", ValueType::Number));
        joined(&mut model, o, "user_id", p, "order_id");
        joined(&mut model, u, "id", o, "user_id");
        let result = compiler().compile(&model);
        assert!(result.warnings.is_empty());
        assert_eq!(
            result.sql,
            "SELECT * FROM users\nINNER JOIN orders ON users.id = orders.user_id \nINNER JOIN payments ON orders.user_id = payments.order_id "
        );
    }

    #[test]
    fn test_cycle_predicate_goes_to_later_clause() {
        let mut model = QueryModel::new();
        let a = model.add_table(TableSelection::new("", "a"));
        let b = model.add_table(TableSelection::new("", "b"));
        let c = model.add_table(TableSelection::new("", "c"));
        joined(&mut model, a, "b_id", b, "id");
        joined(&mut model, a, "c_id", c, "id");
        joined(&mut model, c, "id", b, "c_id");
        let result = compiler().compile(&model);
        assert!(result.valid, "{:?}", result.errors);
        assert!(result.warnings.is_empty());
        assert_eq!(
            result.sql,
            "SELECT * FROM a\nINNER JOIN b ON a.b_id = b.id \nINNER JOIN c ON a.c_id = c.id AND c.id = b.c_id "
        );
    }

    #[test]
    fn test_cycle_through_from_table() {
        let mut model = QueryModel::new();
        let a = model.add_table(TableSelection::new("", "a"));
        let b = model.add_table(TableSelection::new("", "b"));
        let c = model.add_table(TableSelection::new("", "c"));
        joined(&mut model, a, "id", b, "a_id");
        joined(&mut model, b, "id", c, "b_id");
        joined(&mut model, c, "a_id", a, "id");
        assert_eq!(
            compiler().compile(&model).sql,
            "SELECT * FROM a\nINNER JOIN b ON a.id = b.a_id \nINNER JOIN c ON b.id = c.b_id AND c.a_id = a.id "
        );
    }

    #[test]
    fn test_cross_joined_component_keeps_cross_clause() {
        let mut model = QueryModel::new();
        model.add_table(users());
        let x = model.add_table(TableSelection::new("", "x"));
        let y = model.add_table(TableSelection::new("", "y"));
        let z = model.add_table(TableSelection::new("", "z"));
        joined(&mut model, x, "id", y, "x_id");
        joined(&mut model, y, "id", z, "y_id");
        joined(&mut model, z, "x_id", x, "id");
        let result = compiler().compile(&model);
        assert!(result.valid);
        assert_eq!(
            result.sql,
            "SELECT * FROM users\nCROSS JOIN x\nINNER JOIN y ON x.id = y.x_id \nINNER JOIN z ON y.id = z.y_id AND z.x_id = x.id "
        );
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("'x'"));
    }

    #[test]
    fn test_duplicate_pair_policies() {
        let mut model = QueryModel::new();
        let u = model.add_table(users());
        let o = model.add_table(orders());
        joined(&mut model, u, "id", o, "user_id");
        joined(&mut model, u, "name", o, "total");

        let allow = compiler().compile(&model);
        assert!(allow.valid && allow.warnings.is_empty());
        assert!(allow
            .sql
            .contains("ON users.id = orders.user_id AND users.name = orders.total "));

        let warn = SqlCompiler::new(CompilerSettings {
            duplicate_joins: DuplicateJoinPolicy::Warn,
            ..CompilerSettings::default()
        })
        .compile(&model);
        assert!(warn.valid);
        assert_eq!(warn.warnings.len(), 1);

        let reject = SqlCompiler::new(CompilerSettings {
            duplicate_joins: DuplicateJoinPolicy::Reject,
            ..CompilerSettings::default()
        })
        .compile(&model);
        assert!(!reject.valid);
    }

    // ── WHERE ───────────────────────────────────────────────────────

    #[test]
    fn test_nested_groups_parenthesized() {
        let root = ConditionGroup::and([
            ConditionNode::from(ConditionLeaf::compare("a", Operator::Eq, Value::from(1))),
            ConditionNode::from(ConditionGroup::or([
                ConditionLeaf::compare("b", Operator::Eq, Value::from("x")),
                ConditionLeaf::compare("c", Operator::Gt, Value::from(2)),
            ])),
        ]);
        let sql = where_of(root).sql;
        assert!(sql.ends_with("WHERE a = 1 AND (b = 'x' OR c > 2)"));
    }

    #[test]
    fn test_empty_groups_omitted() {
        let root = ConditionGroup::default()
            .add_group()
            .with(ConditionLeaf::compare("a", Operator::Eq, Value::from(1)))
            .add_group();
        assert!(where_of(root).sql.ends_with("WHERE a = 1"));
        let only_empty = ConditionGroup::default().add_group().add_group();
        assert!(!where_of(only_empty).sql.contains("WHERE"));
    }

    #[test]
    fn test_null_and_list_operators() {
        let root = ConditionGroup::and([
            leaf("deleted_at", Operator::IsNull, ConditionValue::None),
            leaf(
                "status",
                Operator::In,
                ConditionValue::Scalar(Value::from(" active, 3 ,pending,")),
            ),
            leaf(
                "id",
                Operator::NotIn,
                ConditionValue::List(vec![Value::from(1), Value::from(2)]),
            ),
        ]);
        let result = where_of(root);
        assert!(result.valid);
        assert!(result.sql.ends_with(
            "WHERE deleted_at IS NULL AND status IN ('active', 3, 'pending') AND id NOT IN (1, 2)"
        ));
    }

    #[test]
    fn test_empty_in_list_is_error() {
        let root = ConditionGroup::and([leaf("status", Operator::In, ConditionValue::List(vec![]))]);
        let result = where_of(root);
        assert!(!result.valid);
        assert!(!result.sql.contains("WHERE"));
    }

    #[test]
    fn test_between() {
        let root = ConditionGroup::and([
            leaf("n", Operator::Between, ConditionValue::Range(Value::from(1), Value::from(9))),
            leaf("d", Operator::NotBetween, ConditionValue::Scalar(Value::from("2024-01-01, 2024-12-31"))),
        ]);
        let result = where_of(root);
        assert!(result.sql.ends_with(
            "WHERE n BETWEEN 1 AND 9 AND d NOT BETWEEN '2024-01-01' AND '2024-12-31'"
        ));
        let missing = ConditionGroup::and([leaf(
            "n",
            Operator::Between,
            ConditionValue::Range(Value::Null, Value::from(9)),
        )]);
        assert!(!where_of(missing).valid);
    }

    #[test]
    fn test_unbound_leaf_is_error() {
        let result = where_of(ConditionGroup::default().add_leaf());
        assert!(!result.valid);
        assert_eq!(result.errors, vec!["a condition has no column selected"]);
    }

    #[test]
    fn test_qualified_and_dangling_leaf() {
        let mut model = QueryModel::new();
        let u = model.add_table(users().with_alias("u"));
        model.set_conditions(ConditionGroup::and([
            ConditionLeaf::compare("name", Operator::Like, Value::from("A%")).on(u),
            ConditionLeaf::compare("x", Operator::Eq, Value::from(1)).on(TableId::new()),
        ]));
        let result = compiler().compile(&model);
        assert!(result.sql.ends_with("WHERE u.name LIKE 'A%'"));
        assert!(!result.valid);
    }

    #[test]
    fn test_parameter_reference_kept() {
        let root = ConditionGroup::and([ConditionLeaf::compare("id", Operator::Eq, Value::from(":userId"))]);
        assert!(where_of(root).sql.ends_with("WHERE id = :userId"));
    }

    #[test]
    fn test_literal_policy_applies() {
        let mut model = QueryModel::new();
        model.add_table(TableSelection::new("", "t"));
        model.set_conditions(ConditionGroup::and([ConditionLeaf::compare(
            "zip",
            Operator::Eq,
            Value::from("02134"),
        )]));
        let permissive = compiler().compile(&model);
        assert!(permissive.sql.ends_with("zip = 02134"));
        let strict = SqlCompiler::new(CompilerSettings {
            literal_policy: LiteralPolicy::Strict,
            ..CompilerSettings::default()
        })
        .compile(&model);
        assert!(strict.sql.ends_with("zip = '02134'"));
    }

    #[test]
    fn test_deep_tree_does_not_overflow() {
        let mut group = ConditionGroup::and([ConditionLeaf::compare("x", Operator::Eq, Value::from(1))]);
        for _ in 0..2_000 {
            group = ConditionGroup::and([ConditionNode::from(group)]);
        }
        let result = where_of(group);
        assert!(result.sql.ends_with("WHERE x = 1"));
    }

    // ── Paging ──────────────────────────────────────────────────────

    #[test]
    fn test_offset_requires_limit() {
        let mut model = QueryModel::new();
        model.add_table(TableSelection::new("", "t"));
        model.set_offset(Some(20));
        assert_eq!(compiler().compile(&model).sql, "SELECT * FROM t");
        model.set_limit(Some(10));
        assert_eq!(compiler().compile(&model).sql, "SELECT * FROM t\nLIMIT 10\nOFFSET 20");
        model.set_offset(Some(0));
        assert_eq!(compiler().compile(&model).sql, "SELECT * FROM t\nLIMIT 10");
    }

    #[test]
    fn test_compile_is_deterministic() {
        let mut model = QueryModel::new();
        let u = model.add_table(users());
        let o = model.add_table(orders());
        joined(&mut model, u, "id", o, "user_id");
        model.add_table(TableSelection::new("", "audit"));
        let c = compiler();
        assert_eq!(c.compile(&model), c.compile(&model));
    }
}
