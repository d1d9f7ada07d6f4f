//! The operator catalog and column type inference.
//!
//! [`OPERATORS`] is a static table mapping each comparison operator to its
//! display label, the value types it applies to, and the shape of value it
//! takes. [`available_operators`] filters it for a column type, and
//! [`infer_type`] maps a source-system type name onto a [`ValueType`].
//! Both are pure lookups with no failure modes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::value::ValueType;

/// A comparison operator usable in a condition leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// `=`
    #[serde(rename = "=")]
    Eq,
    /// `!=`
    #[serde(rename = "!=")]
    Ne,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `>=`
    #[serde(rename = ">=")]
    Gte,
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `<=`
    #[serde(rename = "<=")]
    Lte,
    /// `LIKE`
    #[serde(rename = "LIKE")]
    Like,
    /// `NOT LIKE`
    #[serde(rename = "NOT LIKE")]
    NotLike,
    /// `IN`
    #[serde(rename = "IN")]
    In,
    /// `NOT IN`
    #[serde(rename = "NOT IN")]
    NotIn,
    /// `BETWEEN`
    #[serde(rename = "BETWEEN")]
    Between,
    /// `NOT BETWEEN`
    #[serde(rename = "NOT BETWEEN")]
    NotBetween,
    /// `IS NULL`
    #[serde(rename = "IS NULL")]
    IsNull,
    /// `IS NOT NULL`
    #[serde(rename = "IS NOT NULL")]
    IsNotNull,
}

impl Operator {
    /// Returns the SQL spelling of this operator.
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Between => "BETWEEN",
            Self::NotBetween => "NOT BETWEEN",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }

    /// Returns this operator's catalog entry.
    pub fn info(&self) -> &'static OperatorInfo {
        // Every operator has exactly one entry; the fallback is unreachable.
        OPERATORS
            .iter()
            .find(|info| info.operator == *self)
            .unwrap_or(&OPERATORS[0])
    }

    /// Returns the value arity this operator requires.
    pub fn arity(&self) -> Arity {
        self.info().arity
    }

    /// Returns `true` if this operator may be applied to a column of `value_type`.
    pub fn applies_to(&self, value_type: ValueType) -> bool {
        self.info().applies_to.contains(value_type)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        match normalized.as_str() {
            "<>" => Ok(Self::Ne),
            other => OPERATORS
                .iter()
                .find(|info| info.operator.symbol() == other)
                .map(|info| info.operator)
                .ok_or_else(|| format!("unknown operator '{s}'")),
        }
    }
}

/// How many values an operator consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arity {
    /// No value (`IS NULL`).
    None,
    /// Exactly one value.
    Single,
    /// Any number of values (`IN`).
    List,
    /// A lower and an upper bound (`BETWEEN`).
    Range,
}

/// The set of value types an operator applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applicability {
    /// The wildcard: every type.
    All,
    /// Only the listed types.
    Only(&'static [ValueType]),
}

impl Applicability {
    /// Returns `true` if `value_type` is in this set.
    pub fn contains(&self, value_type: ValueType) -> bool {
        match self {
            Self::All => true,
            Self::Only(types) => types.contains(&value_type),
        }
    }
}

/// One row of the operator catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorInfo {
    /// The operator.
    pub operator: Operator,
    /// Human-readable label shown in the condition editor.
    pub label: &'static str,
    /// The column types this operator may be applied to.
    pub applies_to: Applicability,
    /// The value shape this operator consumes.
    pub arity: Arity,
}

const ORDERED: &[ValueType] = &[ValueType::Number, ValueType::Date];
const LISTABLE: &[ValueType] = &[ValueType::String, ValueType::Number];
const TEXTUAL: &[ValueType] = &[ValueType::String];

/// The static operator catalog, in display order.
pub static OPERATORS: [OperatorInfo; 14] = [
    OperatorInfo {
        operator: Operator::Eq,
        label: "equals",
        applies_to: Applicability::All,
        arity: Arity::Single,
    },
    OperatorInfo {
        operator: Operator::Ne,
        label: "does not equal",
        applies_to: Applicability::All,
        arity: Arity::Single,
    },
    OperatorInfo {
        operator: Operator::Gt,
        label: "greater than",
        applies_to: Applicability::Only(ORDERED),
        arity: Arity::Single,
    },
    OperatorInfo {
        operator: Operator::Gte,
        label: "greater than or equal to",
        applies_to: Applicability::Only(ORDERED),
        arity: Arity::Single,
    },
    OperatorInfo {
        operator: Operator::Lt,
        label: "less than",
        applies_to: Applicability::Only(ORDERED),
        arity: Arity::Single,
    },
    OperatorInfo {
        operator: Operator::Lte,
        label: "less than or equal to",
        applies_to: Applicability::Only(ORDERED),
        arity: Arity::Single,
    },
    OperatorInfo {
        operator: Operator::Like,
        label: "contains",
        applies_to: Applicability::Only(TEXTUAL),
        arity: Arity::Single,
    },
    OperatorInfo {
        operator: Operator::NotLike,
        label: "does not contain",
        applies_to: Applicability::Only(TEXTUAL),
        arity: Arity::Single,
    },
    OperatorInfo {
        operator: Operator::In,
        label: "is one of",
        applies_to: Applicability::Only(LISTABLE),
        arity: Arity::List,
    },
    OperatorInfo {
        operator: Operator::NotIn,
        label: "is not one of",
        applies_to: Applicability::Only(LISTABLE),
        arity: Arity::List,
    },
    OperatorInfo {
        operator: Operator::Between,
        label: "is between",
        applies_to: Applicability::Only(ORDERED),
        arity: Arity::Range,
    },
    OperatorInfo {
        operator: Operator::NotBetween,
        label: "is not between",
        applies_to: Applicability::Only(ORDERED),
        arity: Arity::Range,
    },
    OperatorInfo {
        operator: Operator::IsNull,
        label: "is empty",
        applies_to: Applicability::All,
        arity: Arity::None,
    },
    OperatorInfo {
        operator: Operator::IsNotNull,
        label: "is not empty",
        applies_to: Applicability::All,
        arity: Arity::None,
    },
];

/// Returns the operators applicable to a column of the given type.
///
/// With no column bound yet (`None`) the full catalog is returned.
///
/// # Examples
///
/// ```
/// use querycraft_builder::catalog::{available_operators, Operator};
/// use querycraft_builder::value::ValueType;
///
/// let ops: Vec<Operator> = available_operators(Some(ValueType::Boolean))
///     .iter()
///     .map(|info| info.operator)
///     .collect();
/// assert_eq!(ops, vec![Operator::Eq, Operator::Ne, Operator::IsNull, Operator::IsNotNull]);
/// assert_eq!(available_operators(None).len(), 14);
/// ```
pub fn available_operators(value_type: Option<ValueType>) -> Vec<&'static OperatorInfo> {
    OPERATORS
        .iter()
        .filter(|info| value_type.map_or(true, |vt| info.applies_to.contains(vt)))
        .collect()
}

/// Returns the first catalog operator applicable to `value_type`.
pub fn default_operator(value_type: ValueType) -> Operator {
    available_operators(Some(value_type))
        .first()
        .map_or(Operator::Eq, |info| info.operator)
}

/// Maps a source-system column type name onto a canonical [`ValueType`].
///
/// Matching is case-insensitive and ignores length/precision suffixes such as
/// `VARCHAR(255)` or `NUMERIC(10, 2)`. Array types (`INTEGER[]`, `ARRAY<…>`,
/// PostgreSQL's `_int4`) map to `Array`. Anything unrecognised maps to
/// `String`; the function never fails.
///
/// # Examples
///
/// ```
/// use querycraft_builder::catalog::infer_type;
/// use querycraft_builder::value::ValueType;
///
/// assert_eq!(infer_type("INTEGER"), ValueType::Number);
/// assert_eq!(infer_type("varchar(255)"), ValueType::String);
/// assert_eq!(infer_type("TIMESTAMP WITH TIME ZONE"), ValueType::Date);
/// assert_eq!(infer_type("GEOGRAPHY"), ValueType::String);
/// ```
pub fn infer_type(type_name: &str) -> ValueType {
    let upper = type_name.trim().to_uppercase();
    if upper.ends_with("[]") || upper.starts_with("ARRAY") || upper.starts_with('_') {
        return ValueType::Array;
    }

    let base = upper
        .split('(')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_start_matches("UNSIGNED ")
        .trim_end_matches(" UNSIGNED");

    match base {
        "INT" | "INTEGER" | "INT2" | "INT4" | "INT8" | "BIGINT" | "SMALLINT" | "TINYINT"
        | "MEDIUMINT" | "SERIAL" | "BIGSERIAL" | "SMALLSERIAL" | "DECIMAL" | "NUMERIC"
        | "NUMBER" | "FLOAT" | "FLOAT4" | "FLOAT8" | "DOUBLE" | "DOUBLE PRECISION" | "REAL"
        | "MONEY" => ValueType::Number,
        "BOOL" | "BOOLEAN" | "BIT" => ValueType::Boolean,
        "DATE" | "DATETIME" | "DATETIME2" | "SMALLDATETIME" | "TIME" | "TIMETZ" | "TIMESTAMP"
        | "TIMESTAMPTZ" | "INTERVAL" | "YEAR" => ValueType::Date,
        _ if base.starts_with("TIMESTAMP") || base.starts_with("TIME ") => ValueType::Date,
        _ => ValueType::String,
    }
}
