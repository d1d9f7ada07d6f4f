//! Validating and binding parameter values.
//!
//! [`ParameterBinder::validate`] checks one supplied value against its
//! descriptor and reports the first problem found:
//!
//! 1. an empty value for a required parameter (`required`);
//! 2. a value that does not fit the declared type (`invalid_number`,
//!    `invalid_date`, `invalid_array`);
//! 3. the first failing custom validator (`custom`).
//!
//! Empty optional parameters are always valid. Values usually arrive as the
//! text a user typed, so strings are accepted for every scalar type as long
//! as they parse. [`ParameterBinder::bind`] runs the same checks and then
//! coerces each value into its typed form.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use querycraft_core::{QueryCraftError, QueryCraftResult, ValidationError};
use serde::{Deserialize, Serialize};

use super::extractor::ParameterDescriptor;
use super::validators::ParameterValidator;
use crate::value::{Value, ValueType};

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// Parses date or timestamp text.
///
/// Accepts RFC 3339, `YYYY-MM-DD[ T]HH:MM[:SS[.fff]]`, `YYYY-MM-DD` and
/// `YYYY/MM/DD`. A plain date parses to [`Value::Date`], anything with a time
/// to [`Value::DateTime`].
///
/// # Examples
///
/// ```
/// use querycraft_builder::params::parse_date;
///
/// assert!(parse_date("2024-01-31").is_some());
/// assert!(parse_date("2024-01-31T08:15:00Z").is_some());
/// assert!(parse_date("31/01/2024").is_none());
/// ```
pub fn parse_date(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(Value::DateTime(dt.naive_utc()));
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Value::DateTime(dt));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(text, format) {
            return Some(Value::Date(d));
        }
    }
    None
}

fn parse_number(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::Int(i));
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Value::Float)
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// The outcome of validating a full set of parameter values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// `true` when no parameter failed.
    pub is_valid: bool,
    /// Per-parameter errors, keyed by parameter name.
    pub errors: BTreeMap<String, ValidationError>,
}

impl ValidationReport {
    /// The error messages keyed by parameter name.
    pub fn messages(&self) -> BTreeMap<String, String> {
        self.errors
            .iter()
            .map(|(name, error)| (name.clone(), error.message.clone()))
            .collect()
    }

    /// Converts a failing report into a compound [`ValidationError`].
    pub fn into_error(self) -> ValidationError {
        let field_errors: HashMap<String, Vec<ValidationError>> = self
            .errors
            .into_iter()
            .map(|(name, error)| (name, vec![error]))
            .collect();
        ValidationError::with_field_errors(field_errors)
    }
}

/// A parameter value ready to be handed to an execution service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundParameter {
    /// The parameter name.
    pub name: String,
    /// The coerced value.
    pub value: Value,
}

/// Bound values in parameter order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundParameters {
    /// One entry per descriptor, in descriptor order.
    pub values: Vec<BoundParameter>,
}

impl BoundParameters {
    /// Looks up a bound value by parameter name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    /// The bound values as a name-to-value map.
    pub fn to_map(&self) -> HashMap<String, Value> {
        self.values
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect()
    }

    /// Number of bound values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Validates parameter values and coerces them for execution.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use querycraft_builder::params::{extract_parameters, ParameterBinder, RangeValidator};
/// use querycraft_builder::value::Value;
///
/// let params = extract_parameters("SELECT * FROM users WHERE age > :minAge");
/// let binder = ParameterBinder::new().with_validator("minAge", RangeValidator::at_least(0.0));
///
/// let mut values = HashMap::new();
/// values.insert("minAge".to_string(), Value::from("21"));
/// let bound = binder.bind(&params, &values).unwrap();
/// assert_eq!(bound.get("minAge"), Some(&Value::Int(21)));
///
/// values.insert("minAge".to_string(), Value::from("-1"));
/// assert!(binder.bind(&params, &values).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ParameterBinder {
    validators: HashMap<String, Vec<Arc<dyn ParameterValidator>>>,
}

impl ParameterBinder {
    /// Creates a binder with no custom validators.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom validator for the named parameter (builder style).
    pub fn with_validator(
        mut self,
        name: impl Into<String>,
        validator: impl ParameterValidator + 'static,
    ) -> Self {
        self.add_validator(name, validator);
        self
    }

    /// Adds a custom validator for the named parameter.
    pub fn add_validator(
        &mut self,
        name: impl Into<String>,
        validator: impl ParameterValidator + 'static,
    ) {
        self.validators
            .entry(name.into())
            .or_default()
            .push(Arc::new(validator));
    }

    /// Validates one value. Returns `None` when the value is acceptable.
    pub fn validate(
        &self,
        descriptor: &ParameterDescriptor,
        value: Option<&Value>,
    ) -> Option<ValidationError> {
        let value = match value {
            Some(v) if !v.is_empty() => v,
            _ if descriptor.required => {
                return Some(ValidationError::new(
                    "This parameter is required.",
                    "required",
                ));
            }
            _ => return None,
        };

        if let Some(error) = check_type(descriptor.param_type, value) {
            return Some(error);
        }

        self.validators
            .get(&descriptor.name)
            .into_iter()
            .flatten()
            .find_map(|validator| validator.validate(value).err())
            .map(|mut error| {
                error.code = "custom".to_string();
                error
            })
    }

    /// Validates every descriptor against `values`.
    pub fn validate_all(
        &self,
        descriptors: &[ParameterDescriptor],
        values: &HashMap<String, Value>,
    ) -> ValidationReport {
        let errors: BTreeMap<String, ValidationError> = descriptors
            .iter()
            .filter_map(|d| {
                self.validate(d, values.get(&d.name))
                    .map(|error| (d.name.clone(), error))
            })
            .collect();
        ValidationReport {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// Validates and coerces every value.
    ///
    /// Missing optional values bind to their default, or to NULL.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::ValidationError`] carrying per-parameter
    /// errors when any value fails validation.
    pub fn bind(
        &self,
        descriptors: &[ParameterDescriptor],
        values: &HashMap<String, Value>,
    ) -> QueryCraftResult<BoundParameters> {
        let report = self.validate_all(descriptors, values);
        if !report.is_valid {
            return Err(QueryCraftError::ValidationError(report.into_error()));
        }
        let values = descriptors
            .iter()
            .map(|d| {
                let value = match values.get(&d.name) {
                    Some(v) if !v.is_empty() => coerce(d.param_type, v),
                    _ => d.default_value.clone().unwrap_or(Value::Null),
                };
                BoundParameter {
                    name: d.name.clone(),
                    value,
                }
            })
            .collect();
        Ok(BoundParameters { values })
    }
}

fn check_type(param_type: ValueType, value: &Value) -> Option<ValidationError> {
    let ok = match param_type {
        ValueType::Number => match value {
            Value::Int(_) => true,
            Value::Float(f) => f.is_finite(),
            Value::String(s) => parse_number(s).is_some(),
            _ => false,
        },
        ValueType::Date => match value {
            Value::Date(_) | Value::DateTime(_) => true,
            Value::String(s) => parse_date(s).is_some(),
            _ => false,
        },
        ValueType::Array => matches!(value, Value::List(_)),
        ValueType::String | ValueType::Boolean => true,
    };
    if ok {
        return None;
    }
    let (message, code) = match param_type {
        ValueType::Number => ("Enter a number.", "invalid_number"),
        ValueType::Date => ("Enter a valid date.", "invalid_date"),
        _ => ("Enter a list of values.", "invalid_array"),
    };
    Some(ValidationError::new(message, code))
}

fn coerce(param_type: ValueType, value: &Value) -> Value {
    match (param_type, value) {
        (ValueType::Number, Value::String(s)) => parse_number(s).unwrap_or_else(|| value.clone()),
        (ValueType::Date, Value::String(s)) => parse_date(s).unwrap_or_else(|| value.clone()),
        (ValueType::Boolean, Value::String(s)) => {
            parse_bool(s).map_or_else(|| value.clone(), Value::Bool)
        }
        (ValueType::Boolean, Value::Int(i)) => Value::Bool(*i != 0),
        _ => value.clone(),
    }
}
