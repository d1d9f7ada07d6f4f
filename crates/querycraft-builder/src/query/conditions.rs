//! The recursive AND/OR condition tree.
//!
//! A query's filter is always a [`ConditionGroup`]: a logic connective over
//! an ordered list of children, each either a [`ConditionLeaf`] predicate or
//! a nested group. Nesting depth is unbounded.
//!
//! Every edit is copy-on-write. Operations take `&self` and return a new
//! group; untouched children are shared through [`Arc`], so two snapshots of
//! a model differ only along the edited path.
//!
//! # Examples
//!
//! ```
//! use querycraft_builder::catalog::Operator;
//! use querycraft_builder::query::conditions::{ConditionGroup, ConditionLeaf, Logic};
//! use querycraft_builder::value::Value;
//!
//! let status = ConditionLeaf::compare("status", Operator::Eq, Value::from("active"));
//! let age = ConditionLeaf::compare("age", Operator::Gt, Value::from(30));
//! let filter = ConditionGroup::new(Logic::And).with(status).with(age);
//! assert_eq!(filter.leaf_count(), 2);
//!
//! let trimmed = filter.remove_at(0).unwrap();
//! assert_eq!(trimmed.leaf_count(), 1);
//! assert_eq!(filter.leaf_count(), 2);
//! ```

use std::fmt;
use std::sync::Arc;

use querycraft_core::{QueryCraftError, QueryCraftResult};
use serde::{Deserialize, Serialize};

use super::model::TableId;
use crate::catalog::{default_operator, Operator};
use crate::value::{ConditionValue, Value, ValueType};

/// The boolean connective of a condition group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    /// All children must hold.
    #[default]
    And,
    /// At least one child must hold.
    Or,
}

impl Logic {
    /// Returns the SQL keyword for this connective.
    pub const fn sql_keyword(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_keyword())
    }
}

/// A single comparison predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionLeaf {
    /// The table the column belongs to. `None` renders the column unqualified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_id: Option<TableId>,
    /// The column name. Empty until the user picks a column.
    pub column: String,
    /// The comparison operator.
    pub operator: Operator,
    /// The canonical type of the column.
    pub value_type: ValueType,
    /// The comparison value, shaped by the operator's arity.
    pub value: ConditionValue,
}

impl Default for ConditionLeaf {
    fn default() -> Self {
        Self {
            table_id: None,
            column: String::new(),
            operator: Operator::Eq,
            value_type: ValueType::String,
            value: ConditionValue::default(),
        }
    }
}

impl ConditionLeaf {
    /// Creates a leaf from its parts.
    pub fn new(
        column: impl Into<String>,
        operator: Operator,
        value_type: ValueType,
        value: ConditionValue,
    ) -> Self {
        Self {
            table_id: None,
            column: column.into(),
            operator,
            value_type,
            value,
        }
    }

    /// Creates a leaf comparing a column against a single value, taking the
    /// column type from the value.
    pub fn compare(column: impl Into<String>, operator: Operator, value: Value) -> Self {
        let value_type = value.value_type();
        Self::new(column, operator, value_type, ConditionValue::Scalar(value))
    }

    /// Creates an `IS NULL` / `IS NOT NULL` style leaf that carries no value.
    pub fn nullary(column: impl Into<String>, operator: Operator, value_type: ValueType) -> Self {
        Self::new(column, operator, value_type, ConditionValue::None)
    }

    /// Qualifies this leaf's column with a table.
    pub fn on(mut self, table_id: TableId) -> Self {
        self.table_id = Some(table_id);
        self
    }

    /// Returns `true` once a column has been chosen.
    pub fn is_bound(&self) -> bool {
        !self.column.trim().is_empty()
    }

    /// Returns `true` if this leaf's column belongs to `table_id`.
    pub fn references(&self, table_id: TableId) -> bool {
        self.table_id == Some(table_id)
    }

    fn apply(&self, patch: LeafPatch) -> QueryCraftResult<Self> {
        let mut leaf = self.clone();
        match patch {
            LeafPatch::Column(binding) => {
                if binding.table_id == leaf.table_id
                    && binding.column == leaf.column
                    && binding.value_type == leaf.value_type
                {
                    return Ok(leaf);
                }
                let operator = default_operator(binding.value_type);
                leaf.table_id = binding.table_id;
                leaf.column = binding.column;
                leaf.value_type = binding.value_type;
                leaf.operator = operator;
                leaf.value = ConditionValue::empty_for(binding.value_type, operator.arity());
            }
            LeafPatch::Operator(operator) => {
                if leaf.is_bound() && !operator.applies_to(leaf.value_type) {
                    return Err(QueryCraftError::InvalidCondition(format!(
                        "operator {operator} does not apply to {} column '{}'",
                        leaf.value_type, leaf.column
                    )));
                }
                let arity = operator.arity();
                if arity != leaf.operator.arity() || !leaf.value.matches_arity(arity) {
                    leaf.value = ConditionValue::empty_for(leaf.value_type, arity);
                }
                leaf.operator = operator;
            }
            LeafPatch::Value(value) => {
                if !value.matches_arity(leaf.operator.arity()) {
                    return Err(QueryCraftError::InvalidCondition(format!(
                        "operator {} expects a {:?} value",
                        leaf.operator,
                        leaf.operator.arity()
                    )));
                }
                leaf.value = value;
            }
        }
        Ok(leaf)
    }
}

/// The column a leaf is (re)bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    /// The owning table, if the column should be qualified.
    pub table_id: Option<TableId>,
    /// The column name.
    pub column: String,
    /// The column's canonical type.
    pub value_type: ValueType,
}

impl ColumnBinding {
    /// Creates an unqualified binding.
    pub fn new(column: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            table_id: None,
            column: column.into(),
            value_type,
        }
    }

    /// Qualifies the binding with a table.
    pub fn on(mut self, table_id: TableId) -> Self {
        self.table_id = Some(table_id);
        self
    }
}

/// A single-field edit to a condition leaf.
///
/// Changing the column resets the operator to the first one applicable to the
/// new type and the value to that type's empty value. Changing the operator to
/// one of a different arity resets the value to the empty value of that arity.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafPatch {
    /// Bind the leaf to a different column.
    Column(ColumnBinding),
    /// Switch the comparison operator.
    Operator(Operator),
    /// Replace the comparison value.
    Value(ConditionValue),
}

/// A child of a condition group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum ConditionNode {
    /// A predicate.
    Leaf(ConditionLeaf),
    /// A nested group.
    Group(ConditionGroup),
}

impl From<ConditionLeaf> for ConditionNode {
    fn from(leaf: ConditionLeaf) -> Self {
        Self::Leaf(leaf)
    }
}

impl From<ConditionGroup> for ConditionNode {
    fn from(group: ConditionGroup) -> Self {
        Self::Group(group)
    }
}

/// A boolean combination of leaves and nested groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    /// The connective joining the children.
    pub logic: Logic,
    /// The children, in display order.
    #[serde(default)]
    pub conditions: Vec<Arc<ConditionNode>>,
}

impl ConditionGroup {
    /// Creates an empty group.
    pub const fn new(logic: Logic) -> Self {
        Self {
            logic,
            conditions: Vec::new(),
        }
    }

    /// Creates an AND group over the given children.
    pub fn and<I, N>(children: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<ConditionNode>,
    {
        Self::of(Logic::And, children)
    }

    /// Creates an OR group over the given children.
    pub fn or<I, N>(children: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<ConditionNode>,
    {
        Self::of(Logic::Or, children)
    }

    fn of<I, N>(logic: Logic, children: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<ConditionNode>,
    {
        Self {
            logic,
            conditions: children.into_iter().map(|c| Arc::new(c.into())).collect(),
        }
    }

    /// Returns the number of direct children.
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// Returns `true` if this group has no direct children.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    // ── Copy-on-write edits ──────────────────────────────────────────

    /// Returns a copy with `node` appended.
    pub fn with(&self, node: impl Into<ConditionNode>) -> Self {
        let mut conditions = self.conditions.clone();
        conditions.push(Arc::new(node.into()));
        Self {
            logic: self.logic,
            conditions,
        }
    }

    /// Returns a copy with a different connective.
    pub fn with_logic(&self, logic: Logic) -> Self {
        Self {
            logic,
            conditions: self.conditions.clone(),
        }
    }

    /// Returns a copy with an unbound leaf appended.
    pub fn add_leaf(&self) -> Self {
        self.with(ConditionLeaf::default())
    }

    /// Returns a copy with an empty AND group appended.
    pub fn add_group(&self) -> Self {
        self.with(Self::new(Logic::And))
    }

    /// Returns a copy without the child at `index`.
    pub fn remove_at(&self, index: usize) -> QueryCraftResult<Self> {
        self.check_index(index)?;
        let mut conditions = self.conditions.clone();
        conditions.remove(index);
        Ok(Self {
            logic: self.logic,
            conditions,
        })
    }

    /// Returns a copy with the leaf at `index` edited.
    pub fn update_leaf(&self, index: usize, patch: LeafPatch) -> QueryCraftResult<Self> {
        self.check_index(index)?;
        let ConditionNode::Leaf(leaf) = self.conditions[index].as_ref() else {
            return Err(QueryCraftError::UnknownCondition(format!(
                "condition {index} is a group, not a leaf"
            )));
        };
        let updated = leaf.apply(patch)?;
        Ok(self.replace(index, ConditionNode::Leaf(updated)))
    }

    /// Returns a copy with the nested group at `index` replaced.
    pub fn update_group(&self, index: usize, group: Self) -> QueryCraftResult<Self> {
        self.group_child(index)?;
        Ok(self.replace(index, ConditionNode::Group(group)))
    }

    /// Applies `f` to the nested group addressed by `path` (child indexes
    /// from this group downward) and returns a copy with the result swapped
    /// in. An empty path addresses this group.
    pub fn with_group_at<F>(&self, path: &[usize], f: F) -> QueryCraftResult<Self>
    where
        F: FnOnce(&Self) -> QueryCraftResult<Self>,
    {
        match path.split_first() {
            None => f(self),
            Some((&index, rest)) => {
                let updated = self.group_child(index)?.with_group_at(rest, f)?;
                self.update_group(index, updated)
            }
        }
    }

    /// Returns the nested group addressed by `path`, if any.
    pub fn group_at(&self, path: &[usize]) -> Option<&Self> {
        let mut group = self;
        for &index in path {
            match group.conditions.get(index).map(AsRef::as_ref) {
                Some(ConditionNode::Group(child)) => group = child,
                _ => return None,
            }
        }
        Some(group)
    }

    /// Returns a copy keeping only the leaves for which `keep` holds.
    ///
    /// Groups emptied by the filter stay in place; they compile to nothing.
    /// Subtrees that lose no leaf are shared with `self`.
    pub fn retain_leaves<F>(&self, keep: F) -> Self
    where
        F: Fn(&ConditionLeaf) -> bool,
    {
        self.filtered(&keep).unwrap_or_else(|| self.clone())
    }

    fn filtered<F>(&self, keep: &F) -> Option<Self>
    where
        F: Fn(&ConditionLeaf) -> bool,
    {
        let mut changed = false;
        let mut kept = Vec::with_capacity(self.conditions.len());
        for child in &self.conditions {
            match child.as_ref() {
                ConditionNode::Leaf(leaf) => {
                    if keep(leaf) {
                        kept.push(Arc::clone(child));
                    } else {
                        changed = true;
                    }
                }
                ConditionNode::Group(group) => match group.filtered(keep) {
                    Some(filtered) => {
                        changed = true;
                        kept.push(Arc::new(ConditionNode::Group(filtered)));
                    }
                    None => kept.push(Arc::clone(child)),
                },
            }
        }
        changed.then(|| Self {
            logic: self.logic,
            conditions: kept,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Returns every leaf in depth-first, left-to-right order.
    pub fn leaves(&self) -> Vec<&ConditionLeaf> {
        let mut out = Vec::new();
        let mut stack: Vec<&ConditionNode> = self.conditions.iter().rev().map(AsRef::as_ref).collect();
        while let Some(node) = stack.pop() {
            match node {
                ConditionNode::Leaf(leaf) => out.push(leaf),
                ConditionNode::Group(group) => {
                    stack.extend(group.conditions.iter().rev().map(AsRef::as_ref));
                }
            }
        }
        out
    }

    /// Returns the number of leaves at any depth.
    pub fn leaf_count(&self) -> usize {
        self.leaves().len()
    }

    /// Returns `true` if no leaf exists at any depth, so the group
    /// contributes nothing to a WHERE clause.
    pub fn is_effectively_empty(&self) -> bool {
        self.leaf_count() == 0
    }

    // ── Internals ────────────────────────────────────────────────────

    fn check_index(&self, index: usize) -> QueryCraftResult<()> {
        if index < self.conditions.len() {
            Ok(())
        } else {
            Err(QueryCraftError::UnknownCondition(format!(
                "index {index} out of range for a group of {}",
                self.conditions.len()
            )))
        }
    }

    fn group_child(&self, index: usize) -> QueryCraftResult<&Self> {
        self.check_index(index)?;
        match self.conditions[index].as_ref() {
            ConditionNode::Group(group) => Ok(group),
            ConditionNode::Leaf(_) => Err(QueryCraftError::UnknownCondition(format!(
                "condition {index} is a leaf, not a group"
            ))),
        }
    }

    fn replace(&self, index: usize, node: ConditionNode) -> Self {
        let mut conditions = self.conditions.clone();
        conditions[index] = Arc::new(node);
        Self {
            logic: self.logic,
            conditions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::available_operators;

    fn status_active() -> ConditionLeaf {
        ConditionLeaf::compare("status", Operator::Eq, Value::from("active"))
    }

    // ── Construction ────────────────────────────────────────────────

    #[test]
    fn test_default_leaf_is_unbound() {
        let leaf = ConditionLeaf::default();
        assert!(!leaf.is_bound());
        assert_eq!(leaf.operator, Operator::Eq);
        assert_eq!(leaf.value, ConditionValue::Scalar(Value::from("")));
    }

    #[test]
    fn test_add_leaf_and_group() {
        let root = ConditionGroup::default().add_leaf().add_group();
        assert_eq!(root.len(), 2);
        assert!(matches!(root.conditions[0].as_ref(), ConditionNode::Leaf(_)));
        assert!(matches!(root.conditions[1].as_ref(), ConditionNode::Group(g) if g.is_empty()));
    }

    #[test]
    fn test_edits_are_copy_on_write() {
        let root = ConditionGroup::and([status_active()]).add_group();
        let edited = root.add_leaf();
        assert_eq!(root.len(), 2);
        assert_eq!(edited.len(), 3);
        assert!(Arc::ptr_eq(&root.conditions[0], &edited.conditions[0]));
        assert!(Arc::ptr_eq(&root.conditions[1], &edited.conditions[1]));
    }

    #[test]
    fn test_remove_at_out_of_range() {
        let root = ConditionGroup::default();
        assert!(matches!(root.remove_at(0), Err(QueryCraftError::UnknownCondition(_))));
    }

    // ── Leaf patches ────────────────────────────────────────────────

    #[test]
    fn test_column_change_resets_operator_and_value() {
        let root = ConditionGroup::and([ConditionLeaf::compare("name", Operator::Like, Value::from("%a%"))]);
        let updated = root
            .update_leaf(0, LeafPatch::Column(ColumnBinding::new("age", ValueType::Number)))
            .unwrap();
        let ConditionNode::Leaf(leaf) = updated.conditions[0].as_ref() else {
            panic!("expected leaf");
        };
        assert_eq!(leaf.column, "age");
        assert_eq!(leaf.value_type, ValueType::Number);
        assert!(available_operators(Some(ValueType::Number))
            .iter()
            .any(|info| info.operator == leaf.operator));
        assert_eq!(leaf.value, ConditionValue::Scalar(Value::Int(0)));
    }

    #[test]
    fn test_same_column_keeps_value() {
        let root = ConditionGroup::and([status_active()]);
        let updated = root
            .update_leaf(0, LeafPatch::Column(ColumnBinding::new("status", ValueType::String)))
            .unwrap();
        assert_eq!(updated, root);
    }

    #[test]
    fn test_operator_change_to_list_resets_value() {
        let root = ConditionGroup::and([status_active()]);
        let updated = root.update_leaf(0, LeafPatch::Operator(Operator::In)).unwrap();
        let ConditionNode::Leaf(leaf) = updated.conditions[0].as_ref() else {
            panic!("expected leaf");
        };
        assert_eq!(leaf.value, ConditionValue::List(vec![]));
    }

    #[test]
    fn test_operator_change_same_arity_keeps_value() {
        let root = ConditionGroup::and([status_active()]);
        let updated = root.update_leaf(0, LeafPatch::Operator(Operator::Like)).unwrap();
        let ConditionNode::Leaf(leaf) = updated.conditions[0].as_ref() else {
            panic!("expected leaf");
        };
        assert_eq!(leaf.value, ConditionValue::Scalar(Value::from("active")));
    }

    #[test]
    fn test_operator_incompatible_with_type() {
        let root = ConditionGroup::and([ConditionLeaf::compare("active", Operator::Eq, Value::from(true))]);
        let err = root.update_leaf(0, LeafPatch::Operator(Operator::Gt)).unwrap_err();
        assert!(matches!(err, QueryCraftError::InvalidCondition(_)));
    }

    #[test]
    fn test_unbound_leaf_accepts_any_operator() {
        let root = ConditionGroup::default().add_leaf();
        assert!(root.update_leaf(0, LeafPatch::Operator(Operator::Between)).is_ok());
    }

    #[test]
    fn test_value_must_match_arity() {
        let root = ConditionGroup::and([status_active()]);
        let err = root
            .update_leaf(0, LeafPatch::Value(ConditionValue::List(vec![Value::from("a")])))
            .unwrap_err();
        assert!(matches!(err, QueryCraftError::InvalidCondition(_)));
    }

    #[test]
    fn test_update_leaf_on_group_index() {
        let root = ConditionGroup::default().add_group();
        assert!(root.update_leaf(0, LeafPatch::Operator(Operator::Eq)).is_err());
    }

    // ── Nested groups ───────────────────────────────────────────────

    #[test]
    fn test_with_group_at_path() {
        let root = ConditionGroup::default().add_leaf().add_group();
        let updated = root
            .with_group_at(&[1], |g| Ok(g.with(status_active()).with_logic(Logic::Or)))
            .unwrap();
        let nested = updated.group_at(&[1]).unwrap();
        assert_eq!(nested.logic, Logic::Or);
        assert_eq!(nested.len(), 1);
        assert!(Arc::ptr_eq(&root.conditions[0], &updated.conditions[0]));
    }

    #[test]
    fn test_with_group_at_bad_path() {
        let root = ConditionGroup::default().add_leaf();
        assert!(root.with_group_at(&[0], |g| Ok(g.clone())).is_err());
        assert!(root.with_group_at(&[3], |g| Ok(g.clone())).is_err());
        assert!(root.group_at(&[0]).is_none());
    }

    #[test]
    fn test_retain_leaves_shares_untouched_subtrees() {
        let table = TableId::new();
        let keep = ConditionGroup::and([status_active()]);
        let drop = ConditionGroup::and([status_active().on(table)]);
        let root = ConditionGroup::default().with(keep).with(drop);
        let filtered = root.retain_leaves(|leaf| !leaf.references(table));
        assert_eq!(filtered.leaf_count(), 1);
        assert_eq!(filtered.len(), 2);
        assert!(Arc::ptr_eq(&root.conditions[0], &filtered.conditions[0]));
    }

    #[test]
    fn test_effectively_empty() {
        let root = ConditionGroup::default().add_group().add_group();
        assert!(root.is_effectively_empty());
        assert!(!root.add_leaf().is_effectively_empty());
    }

    #[test]
    fn test_leaves_order() {
        let a = ConditionLeaf::compare("a", Operator::Eq, Value::from(1));
        let b = ConditionLeaf::compare("b", Operator::Eq, Value::from(2));
        let c = ConditionLeaf::compare("c", Operator::Eq, Value::from(3));
        let root = ConditionGroup::default()
            .with(a)
            .with(ConditionGroup::or([b]))
            .with(c);
        let names: Vec<&str> = root.leaves().iter().map(|l| l.column.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_serde_round_trip() {
        let root = ConditionGroup::default()
            .with(status_active())
            .with(ConditionGroup::or([ConditionLeaf::nullary(
                "deleted_at",
                Operator::IsNull,
                ValueType::Date,
            )]));
        let json = serde_json::to_value(&root).unwrap();
        assert_eq!(json["logic"], "AND");
        assert_eq!(json["conditions"][0]["node"], "leaf");
        assert_eq!(json["conditions"][1]["node"], "group");
        let back: ConditionGroup = serde_json::from_value(json).unwrap();
        assert_eq!(back, root);
    }
}
