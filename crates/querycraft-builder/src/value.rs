//! Value types shared by the condition tree, the parameter binder and the
//! template adapter.
//!
//! - [`Value`] is a single literal (what a user typed or picked).
//! - [`ValueType`] is the closed set of canonical value types every column
//!   and parameter is mapped to.
//! - [`ConditionValue`] is the shape a condition leaf's value takes, which
//!   depends on its operator's [`Arity`](crate::catalog::Arity).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::Arity;

/// A literal value as entered in the builder or bound to a parameter.
///
/// # Examples
///
/// ```
/// use querycraft_builder::value::Value;
///
/// let v = Value::from(42_i64);
/// assert_eq!(v, Value::Int(42));
///
/// let v = Value::from("active");
/// assert_eq!(v, Value::String("active".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// SQL NULL / no value.
    Null,
    /// A boolean value.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit floating-point number.
    Float(f64),
    /// A UTF-8 string, exactly as typed.
    String(String),
    /// A date without time.
    Date(chrono::NaiveDate),
    /// A date and time without timezone.
    DateTime(chrono::NaiveDateTime),
    /// A list of values (for `IN` lists and array parameters).
    List(Vec<Value>),
}

impl Value {
    /// Returns `true` if this is [`Value::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` for values a user would consider "not filled in":
    /// null, a blank string, or an empty list.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(s) => s.trim().is_empty(),
            Self::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Returns the canonical type a column holding this value would have.
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Null | Self::String(_) => ValueType::String,
            Self::Bool(_) => ValueType::Boolean,
            Self::Int(_) | Self::Float(_) => ValueType::Number,
            Self::Date(_) | Self::DateTime(_) => ValueType::Date,
            Self::List(_) => ValueType::Array,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Date(d) => write!(f, "{d}"),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Self::List(items) => {
                let rendered: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
        }
    }
}

// ── Conversions ─────────────────────────────────────────────────────────

macro_rules! value_from {
    ($($source:ty => $variant:ident via $convert:expr),* $(,)?) => {
        $(
            impl From<$source> for Value {
                fn from(v: $source) -> Self {
                    Self::$variant($convert(v))
                }
            }
        )*
    };
}

value_from! {
    bool => Bool via std::convert::identity,
    i32 => Int via i64::from,
    i64 => Int via std::convert::identity,
    f64 => Float via std::convert::identity,
    String => String via std::convert::identity,
    &str => String via str::to_owned,
    chrono::NaiveDate => Date via std::convert::identity,
    chrono::NaiveDateTime => DateTime via std::convert::identity,
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// The canonical value types columns and parameters are mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Free text; also the fallback for anything unrecognised.
    #[default]
    String,
    /// Integers and decimals.
    Number,
    /// True/false flags.
    Boolean,
    /// Dates, times and timestamps.
    Date,
    /// Lists / array columns.
    Array,
}

impl ValueType {
    /// All five canonical types, in catalog order.
    pub const ALL: [Self; 5] = [
        Self::String,
        Self::Number,
        Self::Boolean,
        Self::Date,
        Self::Array,
    ];

    /// Returns the lowercase name of this type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Array => "array",
        }
    }

    /// The canonical empty scalar for this type: `0`, `false`, `NULL`, `''`
    /// or `[]`.
    pub fn empty_scalar(&self) -> Value {
        match self {
            Self::String => Value::String(String::new()),
            Self::Number => Value::Int(0),
            Self::Boolean => Value::Bool(false),
            Self::Date => Value::Null,
            Self::Array => Value::List(Vec::new()),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "string" | "text" => Ok(Self::String),
            "number" | "numeric" => Ok(Self::Number),
            "boolean" | "bool" => Ok(Self::Boolean),
            "date" => Ok(Self::Date),
            "array" | "list" => Ok(Self::Array),
            other => Err(format!("unknown value type '{other}'")),
        }
    }
}

/// The value carried by a condition leaf, shaped by its operator's arity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ConditionValue {
    /// No value (`IS NULL` / `IS NOT NULL`).
    None,
    /// A single value.
    Scalar(Value),
    /// A list of values (`IN` / `NOT IN`).
    List(Vec<Value>),
    /// A lower and upper bound (`BETWEEN` / `NOT BETWEEN`).
    Range(Value, Value),
}

impl ConditionValue {
    /// The canonical empty value for a column type under an operator arity.
    ///
    /// # Examples
    ///
    /// ```
    /// use querycraft_builder::catalog::Arity;
    /// use querycraft_builder::value::{ConditionValue, Value, ValueType};
    ///
    /// assert_eq!(
    ///     ConditionValue::empty_for(ValueType::Number, Arity::Single),
    ///     ConditionValue::Scalar(Value::Int(0)),
    /// );
    /// assert_eq!(
    ///     ConditionValue::empty_for(ValueType::Number, Arity::List),
    ///     ConditionValue::List(vec![]),
    /// );
    /// ```
    pub fn empty_for(value_type: ValueType, arity: Arity) -> Self {
        match arity {
            Arity::None => Self::None,
            Arity::Single => Self::Scalar(value_type.empty_scalar()),
            Arity::List => Self::List(Vec::new()),
            Arity::Range => Self::Range(value_type.empty_scalar(), value_type.empty_scalar()),
        }
    }

    /// Returns `true` if this value's shape fits the given arity.
    pub const fn matches_arity(&self, arity: Arity) -> bool {
        matches!(
            (self, arity),
            (Self::None, Arity::None)
                | (Self::Scalar(_), Arity::Single)
                | (Self::List(_), Arity::List)
                | (Self::Range(..), Arity::Range)
        )
    }
}

impl Default for ConditionValue {
    fn default() -> Self {
        Self::Scalar(Value::String(String::new()))
    }
}
