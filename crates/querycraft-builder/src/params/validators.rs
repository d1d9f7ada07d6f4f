//! Custom parameter validators.
//!
//! Validators are attached to a parameter by name on a
//! [`ParameterBinder`](super::ParameterBinder) and run after the built-in
//! required and type checks pass. The first failing validator decides the
//! error, which is always reported with code `custom`.

use std::fmt;
use std::sync::Arc;

use querycraft_core::ValidationError;
use regex::Regex;

use crate::value::Value;

/// A validator that checks a supplied parameter value.
///
/// Validators must be `Send + Sync` so a binder can be shared across tasks.
pub trait ParameterValidator: Send + Sync + fmt::Debug {
    /// Validates the given value, returning an error if invalid.
    fn validate(&self, value: &Value) -> Result<(), ValidationError>;

    /// Returns a human-readable name for this validator.
    fn name(&self) -> &str;
}

fn custom_error(validator: &dyn ParameterValidator, message: impl Into<String>) -> ValidationError {
    ValidationError::new(message, "custom").with_param("validator", validator.name())
}

/// Reads a number out of a value, accepting numeric strings.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Validates that a numeric value lies within inclusive bounds.
#[derive(Debug, Clone)]
pub struct RangeValidator {
    /// The smallest allowed value.
    pub min: Option<f64>,
    /// The largest allowed value.
    pub max: Option<f64>,
}

impl RangeValidator {
    /// Creates a validator with both bounds optional.
    pub const fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    /// Only a lower bound.
    pub const fn at_least(min: f64) -> Self {
        Self::new(Some(min), None)
    }

    /// Only an upper bound.
    pub const fn at_most(max: f64) -> Self {
        Self::new(None, Some(max))
    }
}

impl ParameterValidator for RangeValidator {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let Some(n) = numeric(value) else {
            return Ok(());
        };
        if let Some(min) = self.min {
            if n < min {
                return Err(custom_error(
                    self,
                    format!("Ensure this value is greater than or equal to {min}."),
                ));
            }
        }
        if let Some(max) = self.max {
            if n > max {
                return Err(custom_error(
                    self,
                    format!("Ensure this value is less than or equal to {max}."),
                ));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "RangeValidator"
    }
}

/// Validates that a string value matches a regular expression.
#[derive(Debug, Clone)]
pub struct PatternValidator {
    /// The pattern the whole value is searched with.
    pub regex: Regex,
    /// The message reported on mismatch.
    pub message: String,
}

impl PatternValidator {
    /// Compiles `pattern`.
    ///
    /// # Errors
    ///
    /// Returns the regex error when `pattern` does not compile.
    pub fn new(pattern: &str, message: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            message: message.into(),
        })
    }
}

impl ParameterValidator for PatternValidator {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        match value {
            Value::String(s) if !self.regex.is_match(s) => {
                Err(custom_error(self, self.message.clone()))
            }
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "PatternValidator"
    }
}

/// Validates that a string has at most `max_length` characters, or a list
/// at most `max_length` items.
#[derive(Debug, Clone)]
pub struct MaxLengthValidator {
    /// The maximum allowed length.
    pub max_length: usize,
}

impl MaxLengthValidator {
    /// Creates a new `MaxLengthValidator` with the given maximum length.
    pub const fn new(max_length: usize) -> Self {
        Self { max_length }
    }
}

impl ParameterValidator for MaxLengthValidator {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let length = match value {
            Value::String(s) => s.chars().count(),
            Value::List(items) => items.len(),
            _ => return Ok(()),
        };
        if length > self.max_length {
            return Err(custom_error(
                self,
                format!(
                    "Ensure this value has at most {} characters (it has {length}).",
                    self.max_length
                ),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "MaxLengthValidator"
    }
}

type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Wraps an arbitrary closure as a validator.
#[derive(Clone)]
pub struct PredicateValidator {
    name: String,
    message: String,
    predicate: Predicate,
}

impl PredicateValidator {
    /// Creates a validator that fails with `message` when `predicate`
    /// returns `false`.
    pub fn new(
        name: impl Into<String>,
        message: impl Into<String>,
        predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            predicate: Arc::new(predicate),
        }
    }
}

impl fmt::Debug for PredicateValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateValidator")
            .field("name", &self.name)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl ParameterValidator for PredicateValidator {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        if (self.predicate)(value) {
            Ok(())
        } else {
            Err(custom_error(self, self.message.clone()))
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_valid() {
        let v = RangeValidator::new(Some(1.0), Some(10.0));
        assert!(v.validate(&Value::Int(1)).is_ok());
        assert!(v.validate(&Value::Float(10.0)).is_ok());
        assert!(v.validate(&Value::from("5")).is_ok());
    }

    #[test]
    fn test_range_invalid() {
        let v = RangeValidator::at_least(18.0);
        let err = v.validate(&Value::Int(17)).unwrap_err();
        assert_eq!(err.code, "custom");
        assert_eq!(err.params.get("validator").map(String::as_str), Some("RangeValidator"));
        assert!(RangeValidator::at_most(3.0).validate(&Value::from("4")).is_err());
    }

    #[test]
    fn test_range_ignores_non_numeric() {
        assert!(RangeValidator::at_most(0.0).validate(&Value::from("abc")).is_ok());
    }

    #[test]
    fn test_pattern() {
        let v = PatternValidator::new(r"^[A-Z]{3}$", "Use a three-letter code.").unwrap();
        assert!(v.validate(&Value::from("EUR")).is_ok());
        let err = v.validate(&Value::from("euro")).unwrap_err();
        assert_eq!(err.message, "Use a three-letter code.");
        assert!(v.validate(&Value::Int(3)).is_ok());
    }

    #[test]
    fn test_pattern_bad_regex() {
        assert!(PatternValidator::new("(", "x").is_err());
    }

    #[test]
    fn test_max_length() {
        let v = MaxLengthValidator::new(3);
        assert!(v.validate(&Value::from("äöü")).is_ok());
        assert!(v.validate(&Value::from("abcd")).is_err());
        assert!(v.validate(&Value::from(vec![1, 2, 3, 4])).is_err());
        assert!(v.validate(&Value::Int(12345)).is_ok());
    }

    #[test]
    fn test_predicate() {
        let v = PredicateValidator::new("even", "Must be even.", |value| {
            matches!(value, Value::Int(i) if i % 2 == 0)
        });
        assert!(v.validate(&Value::Int(4)).is_ok());
        let err = v.validate(&Value::Int(3)).unwrap_err();
        assert_eq!(err.message, "Must be even.");
        assert_eq!(v.name(), "even");
        assert!(format!("{v:?}").contains("even"));
    }
}
