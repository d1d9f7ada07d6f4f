//! Join descriptors and relationship suggestions.
//!
//! A join is created empty ([`QueryModel::add_join`]) and filled in through
//! table and column edits. Once both tables are chosen, the caller can ask
//! for column pairings:
//!
//! 1. [`QueryModel::begin_suggestion`] captures a [`SuggestionRequest`]
//!    tagged with the join id and the endpoint pair it was issued for.
//! 2. [`SuggestionRequest::resolve`] calls the
//!    [`RelationshipSuggestionClient`]. The model is not borrowed while the
//!    call is in flight.
//! 3. [`QueryModel::apply_suggestions`] merges the response, discarding it if
//!    the join's endpoints changed in the meantime.
//!
//! A self-join is rejected by every table setter, so no request is ever
//! issued for one.

use std::fmt;

use querycraft_core::{QueryCraftError, QueryCraftResult, SuggestionSettings};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::model::{QueryModel, TableId};
use crate::services::RelationshipSuggestionClient;

/// Identifies a join within one query model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JoinId(Uuid);

impl JoinId {
    /// Generates a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JoinId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JoinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SQL join kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinKind {
    /// INNER JOIN.
    #[default]
    Inner,
    /// LEFT JOIN.
    Left,
    /// RIGHT JOIN.
    Right,
    /// FULL JOIN.
    Full,
}

impl JoinKind {
    /// Returns the SQL keyword for this join kind.
    pub const fn sql_keyword(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Full => "FULL JOIN",
        }
    }

    /// The kind to emit when the join's sides are swapped.
    pub const fn mirrored(&self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            other => *other,
        }
    }
}

/// One side of a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinSide {
    /// The left-hand table.
    Left,
    /// The right-hand table.
    Right,
}

/// A candidate column pairing produced by the relationship inference service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipSuggestion {
    /// Column on the left table.
    pub left_column: String,
    /// Column on the right table.
    pub right_column: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

/// A join between two selected tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinDescriptor {
    /// The join's id.
    pub id: JoinId,
    /// The left table, once chosen.
    #[serde(default)]
    pub left_table_id: Option<TableId>,
    /// The left column, once chosen.
    #[serde(default)]
    pub left_column: Option<String>,
    /// The right table, once chosen.
    #[serde(default)]
    pub right_table_id: Option<TableId>,
    /// The right column, once chosen.
    #[serde(default)]
    pub right_column: Option<String>,
    /// The join kind.
    #[serde(default)]
    pub kind: JoinKind,
    /// Ranked suggestions for the current endpoint pair.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<RelationshipSuggestion>,
}

impl Default for JoinDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl JoinDescriptor {
    /// Creates an INNER join with empty endpoints.
    pub fn new() -> Self {
        Self {
            id: JoinId::new(),
            left_table_id: None,
            left_column: None,
            right_table_id: None,
            right_column: None,
            kind: JoinKind::Inner,
            suggestions: Vec::new(),
        }
    }

    /// Returns `true` if either side refers to `table_id`.
    pub fn touches(&self, table_id: TableId) -> bool {
        self.left_table_id == Some(table_id) || self.right_table_id == Some(table_id)
    }

    /// Returns both tables once both are chosen.
    pub fn endpoints(&self) -> Option<(TableId, TableId)> {
        self.left_table_id.zip(self.right_table_id)
    }

    /// Returns `true` when both tables and both columns are set.
    pub fn is_complete(&self) -> bool {
        self.endpoints().is_some() && self.left_column.is_some() && self.right_column.is_some()
    }

    /// Returns the table on `side`.
    pub const fn table(&self, side: JoinSide) -> Option<TableId> {
        match side {
            JoinSide::Left => self.left_table_id,
            JoinSide::Right => self.right_table_id,
        }
    }

    fn slots(&mut self, side: JoinSide) -> (&mut Option<TableId>, &mut Option<String>) {
        match side {
            JoinSide::Left => (&mut self.left_table_id, &mut self.left_column),
            JoinSide::Right => (&mut self.right_table_id, &mut self.right_column),
        }
    }

    /// Sets the table on `side`, clearing that side's column and the stored
    /// suggestions when the table actually changes.
    fn assign_table(&mut self, side: JoinSide, table_id: TableId) {
        let (table, column) = self.slots(side);
        if *table != Some(table_id) {
            *table = Some(table_id);
            *column = None;
            self.suggestions.clear();
        }
    }
}

/// A pending suggestion request, tagged with the join and endpoint pair it
/// was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionRequest {
    /// The join the request belongs to.
    pub join_id: JoinId,
    /// The left table at issue time.
    pub left_table_id: TableId,
    /// The right table at issue time.
    pub right_table_id: TableId,
    /// The data source passed to the inference service.
    pub data_source_id: String,
    /// The left table name passed to the inference service.
    pub left_table: String,
    /// The right table name passed to the inference service.
    pub right_table: String,
}

impl SuggestionRequest {
    /// Calls the inference service. Failures are captured in the response
    /// rather than returned, so they can be merged like any other result.
    pub async fn resolve(self, client: &dyn RelationshipSuggestionClient) -> SuggestionResponse {
        let result = client
            .infer(&self.data_source_id, &self.left_table, &self.right_table)
            .await;
        SuggestionResponse {
            request: self,
            result,
        }
    }
}

/// A resolved suggestion request.
#[derive(Debug)]
pub struct SuggestionResponse {
    /// The request this response answers.
    pub request: SuggestionRequest,
    /// The suggestions, or the service failure.
    pub result: QueryCraftResult<Vec<RelationshipSuggestion>>,
}

/// What merging a suggestion response did to the join.
#[derive(Debug, Clone, PartialEq)]
pub enum SuggestionOutcome {
    /// The top suggestion filled both join columns.
    Applied {
        /// The applied left column.
        left_column: String,
        /// The applied right column.
        right_column: String,
    },
    /// Suggestions were stored for manual selection; the join's columns were
    /// already set or auto-apply is off.
    Stored(usize),
    /// The service returned nothing above the confidence threshold.
    NoSuggestion,
    /// The service failed; the join is unchanged apart from cleared suggestions.
    Unavailable(String),
    /// The join's endpoints changed after the request was issued.
    Stale,
    /// The join was removed after the request was issued.
    JoinRemoved,
}

impl QueryModel {
    // ── Join edits ───────────────────────────────────────────────────

    /// Appends an INNER join with empty endpoints and returns its id.
    pub fn add_join(&mut self) -> JoinId {
        let join = JoinDescriptor::new();
        let id = join.id;
        self.joins.push(join);
        id
    }

    /// Looks up a join by id.
    pub fn join(&self, id: JoinId) -> Option<&JoinDescriptor> {
        self.joins.iter().find(|j| j.id == id)
    }

    fn join_mut(&mut self, id: JoinId) -> QueryCraftResult<&mut JoinDescriptor> {
        self.joins
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| QueryCraftError::UnknownJoin(id.to_string()))
    }

    /// Sets both tables of a join at once.
    ///
    /// Joining a table to itself is rejected before anything is changed.
    pub fn set_join_tables(
        &mut self,
        id: JoinId,
        left: TableId,
        right: TableId,
    ) -> QueryCraftResult<()> {
        if left == right {
            return Err(QueryCraftError::InvalidJoin(
                "a table cannot be joined to itself".to_string(),
            ));
        }
        self.require_table(left)?;
        self.require_table(right)?;
        let join = self.join_mut(id)?;
        join.assign_table(JoinSide::Left, left);
        join.assign_table(JoinSide::Right, right);
        Ok(())
    }

    /// Sets one table of a join.
    pub fn set_join_table(
        &mut self,
        id: JoinId,
        side: JoinSide,
        table_id: TableId,
    ) -> QueryCraftResult<()> {
        self.require_table(table_id)?;
        let other = match side {
            JoinSide::Left => JoinSide::Right,
            JoinSide::Right => JoinSide::Left,
        };
        let join = self.join_mut(id)?;
        if join.table(other) == Some(table_id) {
            return Err(QueryCraftError::InvalidJoin(
                "a table cannot be joined to itself".to_string(),
            ));
        }
        join.assign_table(side, table_id);
        Ok(())
    }

    /// Sets or clears one column of a join. The side's table must be chosen,
    /// and when that table lists its columns the name must be among them.
    pub fn set_join_column(
        &mut self,
        id: JoinId,
        side: JoinSide,
        column: Option<String>,
    ) -> QueryCraftResult<()> {
        let column = column.filter(|c| !c.trim().is_empty());
        let join = self
            .join(id)
            .ok_or_else(|| QueryCraftError::UnknownJoin(id.to_string()))?;
        if let Some(name) = &column {
            let table_id = join.table(side).ok_or_else(|| {
                QueryCraftError::InvalidJoin(format!("choose the {side:?} table before its column"))
            })?;
            let table = self.require_table(table_id)?;
            if !table.columns.is_empty() && table.column(name).is_none() {
                return Err(QueryCraftError::UnknownColumn(format!(
                    "{}.{name}",
                    table.table_name
                )));
            }
        }
        *self.join_mut(id)?.slots(side).1 = column;
        Ok(())
    }

    /// Sets both columns of a join. Either both succeed or neither is applied.
    pub fn set_join_columns(
        &mut self,
        id: JoinId,
        left: Option<String>,
        right: Option<String>,
    ) -> QueryCraftResult<()> {
        let before = self.join(id).cloned();
        self.set_join_column(id, JoinSide::Left, left)?;
        if let Err(err) = self.set_join_column(id, JoinSide::Right, right) {
            if let (Some(before), Ok(join)) = (before, self.join_mut(id)) {
                *join = before;
            }
            return Err(err);
        }
        Ok(())
    }

    /// Sets the join kind.
    pub fn set_join_kind(&mut self, id: JoinId, kind: JoinKind) -> QueryCraftResult<()> {
        self.join_mut(id)?.kind = kind;
        Ok(())
    }

    /// Removes a join.
    pub fn remove_join(&mut self, id: JoinId) -> QueryCraftResult<JoinDescriptor> {
        let index = self
            .joins
            .iter()
            .position(|j| j.id == id)
            .ok_or_else(|| QueryCraftError::UnknownJoin(id.to_string()))?;
        Ok(self.joins.remove(index))
    }

    // ── Relationship suggestions ─────────────────────────────────────

    /// Captures a suggestion request for the join's current endpoints.
    ///
    /// Returns `Ok(None)` while either table is still unset.
    pub fn begin_suggestion(
        &self,
        id: JoinId,
        data_source_id: &str,
    ) -> QueryCraftResult<Option<SuggestionRequest>> {
        let join = self
            .join(id)
            .ok_or_else(|| QueryCraftError::UnknownJoin(id.to_string()))?;
        let Some((left, right)) = join.endpoints() else {
            return Ok(None);
        };
        if left == right {
            return Err(QueryCraftError::InvalidJoin(
                "a table cannot be joined to itself".to_string(),
            ));
        }
        Ok(Some(SuggestionRequest {
            join_id: id,
            left_table_id: left,
            right_table_id: right,
            data_source_id: data_source_id.to_string(),
            left_table: self.require_table(left)?.table_name.clone(),
            right_table: self.require_table(right)?.table_name.clone(),
        }))
    }

    /// Merges a suggestion response into its join.
    ///
    /// The response is discarded when the join is gone or its endpoints no
    /// longer match the request. Otherwise suggestions below the confidence
    /// threshold are dropped, the rest are stored ranked by confidence, and the
    /// top one fills the join's columns only if neither column is set yet.
    pub fn apply_suggestions(
        &mut self,
        response: SuggestionResponse,
        settings: &SuggestionSettings,
    ) -> SuggestionOutcome {
        let SuggestionResponse { request, result } = response;
        let Some(join) = self.joins.iter_mut().find(|j| j.id == request.join_id) else {
            debug!(join = %request.join_id, "suggestion for removed join discarded");
            return SuggestionOutcome::JoinRemoved;
        };
        if join.endpoints() != Some((request.left_table_id, request.right_table_id)) {
            warn!(join = %request.join_id, "stale relationship suggestion discarded");
            return SuggestionOutcome::Stale;
        }

        let mut suggestions = match result {
            Ok(suggestions) => suggestions,
            Err(err) => {
                warn!(join = %request.join_id, error = %err, "relationship suggestion unavailable");
                join.suggestions.clear();
                return SuggestionOutcome::Unavailable(err.to_string());
            }
        };
        suggestions.retain(|s| s.confidence.is_finite() && s.confidence >= settings.min_confidence);
        suggestions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        join.suggestions = suggestions;

        let Some(top) = join.suggestions.first() else {
            return SuggestionOutcome::NoSuggestion;
        };
        if settings.auto_apply && join.left_column.is_none() && join.right_column.is_none() {
            let (left_column, right_column) = (top.left_column.clone(), top.right_column.clone());
            join.left_column = Some(left_column.clone());
            join.right_column = Some(right_column.clone());
            debug!(join = %request.join_id, %left_column, %right_column, "suggestion applied");
            SuggestionOutcome::Applied {
                left_column,
                right_column,
            }
        } else {
            SuggestionOutcome::Stored(join.suggestions.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::model::TableSelection;
    use crate::value::ValueType;

    fn model() -> (QueryModel, TableId, TableId, TableId) {
        let mut model = QueryModel::new();
        let u = model.add_table(
            TableSelection::new("", "users").with_column("id", ValueType::Number),
        );
        let o = model.add_table(
            TableSelection::new("", "orders")
                .with_column("id", ValueType::Number)
                .with_column("user_id", ValueType::Number),
        );
        let p = model.add_table(TableSelection::new("", "payments"));
        (model, u, o, p)
    }

    fn response(
        request: SuggestionRequest,
        suggestions: Vec<(&str, &str, f64)>,
    ) -> SuggestionResponse {
        SuggestionResponse {
            request,
            result: Ok(suggestions
                .into_iter()
                .map(|(l, r, c)| RelationshipSuggestion {
                    left_column: l.to_string(),
                    right_column: r.to_string(),
                    confidence: c,
                })
                .collect()),
        }
    }

    // ── Join edits ──────────────────────────────────────────────────

    #[test]
    fn test_add_join_defaults() {
        let (mut model, ..) = model();
        let id = model.add_join();
        let join = model.join(id).unwrap();
        assert_eq!(join.kind, JoinKind::Inner);
        assert!(join.endpoints().is_none());
        assert!(!join.is_complete());
    }

    #[test]
    fn test_self_join_rejected_without_mutation() {
        let (mut model, u, ..) = model();
        let id = model.add_join();
        let before = model.clone();
        assert!(matches!(
            model.set_join_tables(id, u, u),
            Err(QueryCraftError::InvalidJoin(_))
        ));
        assert_eq!(model, before);
    }

    #[test]
    fn test_set_join_table_rejects_other_side() {
        let (mut model, u, ..) = model();
        let id = model.add_join();
        model.set_join_table(id, JoinSide::Left, u).unwrap();
        assert!(model.set_join_table(id, JoinSide::Right, u).is_err());
    }

    #[test]
    fn test_changing_table_clears_column() {
        let (mut model, u, o, p) = model();
        let id = model.add_join();
        model.set_join_tables(id, u, o).unwrap();
        model
            .set_join_columns(id, Some("id".into()), Some("user_id".into()))
            .unwrap();
        model.set_join_table(id, JoinSide::Right, p).unwrap();
        let join = model.join(id).unwrap();
        assert_eq!(join.left_column.as_deref(), Some("id"));
        assert_eq!(join.right_column, None);
    }

    #[test]
    fn test_set_join_columns_is_atomic() {
        let (mut model, u, o, _) = model();
        let id = model.add_join();
        model.set_join_tables(id, u, o).unwrap();
        let err = model
            .set_join_columns(id, Some("id".into()), Some("nope".into()))
            .unwrap_err();
        assert!(matches!(err, QueryCraftError::UnknownColumn(_)));
        assert_eq!(model.join(id).unwrap().left_column, None);
    }

    #[test]
    fn test_column_before_table() {
        let (mut model, ..) = model();
        let id = model.add_join();
        assert!(matches!(
            model.set_join_column(id, JoinSide::Left, Some("id".into())),
            Err(QueryCraftError::InvalidJoin(_))
        ));
    }

    #[test]
    fn test_remove_join() {
        let (mut model, ..) = model();
        let id = model.add_join();
        model.remove_join(id).unwrap();
        assert!(matches!(model.remove_join(id), Err(QueryCraftError::UnknownJoin(_))));
    }

    #[test]
    fn test_mirrored_kind() {
        assert_eq!(JoinKind::Left.mirrored(), JoinKind::Right);
        assert_eq!(JoinKind::Full.mirrored(), JoinKind::Full);
    }

    // ── Suggestions ─────────────────────────────────────────────────

    #[test]
    fn test_begin_suggestion_requires_both_tables() {
        let (mut model, u, ..) = model();
        let id = model.add_join();
        model.set_join_table(id, JoinSide::Left, u).unwrap();
        assert!(model.begin_suggestion(id, "default").unwrap().is_none());
    }

    #[test]
    fn test_top_suggestion_auto_applied() {
        let (mut model, u, o, _) = model();
        let id = model.add_join();
        model.set_join_tables(id, u, o).unwrap();
        let request = model.begin_suggestion(id, "default").unwrap().unwrap();
        assert_eq!(request.left_table, "users");
        let outcome = model.apply_suggestions(
            response(request, vec![("id", "id", 0.4), ("id", "user_id", 0.9)]),
            &SuggestionSettings::default(),
        );
        assert_eq!(
            outcome,
            SuggestionOutcome::Applied {
                left_column: "id".into(),
                right_column: "user_id".into()
            }
        );
        let join = model.join(id).unwrap();
        assert!(join.is_complete());
        assert_eq!(join.suggestions.len(), 2);
        assert!(join.suggestions[0].confidence > join.suggestions[1].confidence);
    }

    #[test]
    fn test_user_columns_not_overwritten() {
        let (mut model, u, o, _) = model();
        let id = model.add_join();
        model.set_join_tables(id, u, o).unwrap();
        model.set_join_column(id, JoinSide::Left, Some("id".into())).unwrap();
        let request = model.begin_suggestion(id, "default").unwrap().unwrap();
        let outcome = model.apply_suggestions(
            response(request, vec![("id", "user_id", 0.9)]),
            &SuggestionSettings::default(),
        );
        assert_eq!(outcome, SuggestionOutcome::Stored(1));
        assert_eq!(model.join(id).unwrap().right_column, None);
    }

    #[test]
    fn test_stale_response_discarded() {
        let (mut model, u, o, p) = model();
        let id = model.add_join();
        model.set_join_tables(id, u, o).unwrap();
        let request = model.begin_suggestion(id, "default").unwrap().unwrap();
        model.set_join_table(id, JoinSide::Right, p).unwrap();
        let outcome = model.apply_suggestions(
            response(request, vec![("id", "user_id", 0.9)]),
            &SuggestionSettings::default(),
        );
        assert_eq!(outcome, SuggestionOutcome::Stale);
        assert!(model.join(id).unwrap().suggestions.is_empty());
    }

    #[test]
    fn test_removed_join_response() {
        let (mut model, u, o, _) = model();
        let id = model.add_join();
        model.set_join_tables(id, u, o).unwrap();
        let request = model.begin_suggestion(id, "default").unwrap().unwrap();
        model.remove_join(id).unwrap();
        let outcome = model.apply_suggestions(response(request, vec![]), &SuggestionSettings::default());
        assert_eq!(outcome, SuggestionOutcome::JoinRemoved);
    }

    #[test]
    fn test_min_confidence_filter() {
        let (mut model, u, o, _) = model();
        let id = model.add_join();
        model.set_join_tables(id, u, o).unwrap();
        let request = model.begin_suggestion(id, "default").unwrap().unwrap();
        let settings = SuggestionSettings {
            auto_apply: true,
            min_confidence: 0.5,
        };
        let outcome = model.apply_suggestions(response(request, vec![("id", "id", 0.2)]), &settings);
        assert_eq!(outcome, SuggestionOutcome::NoSuggestion);
        assert!(!model.join(id).unwrap().is_complete());
    }

    #[test]
    fn test_service_failure_degrades() {
        let (mut model, u, o, _) = model();
        let id = model.add_join();
        model.set_join_tables(id, u, o).unwrap();
        let request = model.begin_suggestion(id, "default").unwrap().unwrap();
        let outcome = model.apply_suggestions(
            SuggestionResponse {
                request,
                result: Err(QueryCraftError::ServiceError("inference offline".into())),
            },
            &SuggestionSettings::default(),
        );
        assert!(matches!(outcome, SuggestionOutcome::Unavailable(msg) if msg.contains("offline")));
        assert!(model.join(id).is_some());
    }
}
