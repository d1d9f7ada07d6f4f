//! Core error types for querycraft.
//!
//! This module provides the error enum [`QueryCraftError`] covering model
//! mutation errors, compile and template errors, external-service failures,
//! configuration errors, and serialization errors, plus the per-item
//! [`ValidationError`] used by the parameter binder.
//!
//! Pure engine functions (the SQL compiler, the parameter extractor and the
//! validator) never return these errors; they report problems through result
//! structs. Only mutations addressed by id, external adapters, template
//! application and configuration loading return `Err`.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Why a parameter value was refused.
///
/// A leaf error carries a `message` and a machine-readable `code`
/// (`required`, `invalid_number`, `invalid_date`, `invalid_array`, `custom`).
/// A report over several parameters leaves both blank and fills
/// `field_errors`, keyed by parameter name.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use querycraft_core::error::ValidationError;
///
/// let missing = ValidationError::new("This parameter is required.", "required");
/// assert_eq!(missing.code, "required");
///
/// let report = ValidationError::with_field_errors(HashMap::from([(
///     "userId".to_string(),
///     vec![ValidationError::new("Enter a number.", "invalid_number")],
/// )]));
/// assert_eq!(report.to_string(), "userId: Enter a number.");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Human-readable reason. Blank for a multi-parameter report.
    pub message: String,
    /// Failure kind, e.g. "required".
    pub code: String,
    /// Values interpolated into the message, such as a validator's name.
    pub params: HashMap<String, String>,
    /// Errors per parameter name.
    pub field_errors: HashMap<String, Vec<Self>>,
}

impl ValidationError {
    /// A single error.
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            params: HashMap::default(),
            field_errors: HashMap::default(),
        }
    }

    /// A report over several parameters.
    pub fn with_field_errors(field_errors: HashMap<String, Vec<Self>>) -> Self {
        Self {
            field_errors,
            ..Self::new("", "")
        }
    }

    /// Attaches a message parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.message.is_empty() || self.field_errors.is_empty() {
            return f.write_str(&self.message);
        }
        let mut names: Vec<&String> = self.field_errors.keys().collect();
        names.sort();
        let parts: Vec<String> = names
            .into_iter()
            .flat_map(|name| {
                self.field_errors[name]
                    .iter()
                    .map(move |error| format!("{name}: {error}"))
            })
            .collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// The primary error type for querycraft.
#[derive(Error, Debug)]
pub enum QueryCraftError {
    // ── Model mutations ──────────────────────────────────────────────

    /// A join was configured in a way the model forbids (e.g. self-join).
    #[error("Invalid join: {0}")]
    InvalidJoin(String),

    /// A table id did not resolve to a selected table.
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// A column name did not resolve inside its table, or a column list
    /// index was out of range.
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// A join id did not resolve to a join in the model.
    #[error("Unknown join: {0}")]
    UnknownJoin(String),

    /// A condition path did not resolve inside the condition tree.
    #[error("Unknown condition: {0}")]
    UnknownCondition(String),

    /// A condition edit would produce an operator/type combination the
    /// operator catalog does not allow.
    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    // ── Compilation and templates ────────────────────────────────────

    /// The query model could not be compiled into executable SQL.
    #[error("Compile error: {0}")]
    CompileError(String),

    /// A template could not be built or applied.
    #[error("Template error: {0}")]
    TemplateError(String),

    // ── Validation ───────────────────────────────────────────────────

    /// One or more parameters failed validation.
    #[error("Validation error: {0}")]
    ValidationError(ValidationError),

    // ── External services ────────────────────────────────────────────

    /// An external collaborator (metadata, suggestion, execution) failed.
    #[error("Service error: {0}")]
    ServiceError(String),

    /// Polling an execution exceeded its retry bound.
    #[error("Timed out: {0}")]
    Timeout(String),

    // ── Configuration ────────────────────────────────────────────────

    /// Settings could not be read or hold an unusable value.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // ── Serialization ────────────────────────────────────────────────

    /// An error occurred during serialization or deserialization.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl QueryCraftError {
    /// Returns `true` if the user can clear this error by editing input.
    ///
    /// Validation errors, bad join configuration and template value errors
    /// are recoverable; external-service, timeout and I/O failures are
    /// advisory and must be retried or reported.
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::ValidationError(_)
            | Self::InvalidJoin(_)
            | Self::InvalidCondition(_)
            | Self::CompileError(_)
            | Self::TemplateError(_) => true,
            Self::UnknownTable(_)
            | Self::UnknownColumn(_)
            | Self::UnknownJoin(_)
            | Self::UnknownCondition(_)
            | Self::ServiceError(_)
            | Self::Timeout(_)
            | Self::ConfigurationError(_)
            | Self::SerializationError(_)
            | Self::IoError(_) => false,
        }
    }
}

impl From<serde_json::Error> for QueryCraftError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// A convenience type alias for `Result<T, QueryCraftError>`.
pub type QueryCraftResult<T> = Result<T, QueryCraftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display_simple() {
        let err = ValidationError::new("This parameter is required.", "required");
        assert_eq!(err.to_string(), "This parameter is required.");
    }

    #[test]
    fn test_validation_error_display_field_errors_sorted() {
        let mut field_errors = HashMap::new();
        field_errors.insert(
            "startDate".to_string(),
            vec![ValidationError::new("Enter a valid date.", "invalid_date")],
        );
        field_errors.insert(
            "limit".to_string(),
            vec![ValidationError::new("Enter a number.", "invalid_number")],
        );
        let err = ValidationError::with_field_errors(field_errors);
        assert_eq!(
            err.to_string(),
            "limit: Enter a number.; startDate: Enter a valid date."
        );
    }

    #[test]
    fn test_validation_error_with_param() {
        let err = ValidationError::new("Enter a number.", "invalid_number").with_param("value", "abc");
        assert_eq!(err.params.get("value").unwrap(), "abc");
    }

    #[test]
    fn test_error_display() {
        let err = QueryCraftError::InvalidJoin("a table cannot be joined to itself".into());
        assert_eq!(err.to_string(), "Invalid join: a table cannot be joined to itself");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(QueryCraftError::ValidationError(ValidationError::new("x", "y")).is_recoverable());
        assert!(QueryCraftError::InvalidJoin("x".into()).is_recoverable());
        assert!(QueryCraftError::TemplateError("x".into()).is_recoverable());
        assert!(!QueryCraftError::ServiceError("x".into()).is_recoverable());
        assert!(!QueryCraftError::Timeout("x".into()).is_recoverable());
        assert!(!QueryCraftError::UnknownTable("x".into()).is_recoverable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: QueryCraftError = io_err.into();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: QueryCraftError = parse_err.into();
        assert!(matches!(err, QueryCraftError::SerializationError(_)));
    }
}
