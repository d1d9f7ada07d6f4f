//! Rendering values as SQL literals.
//!
//! Values are interpolated as literals with minimal quoting: numbers and
//! booleans go bare, everything else is single-quoted with `'` doubled.
//! Whether a *string* that looks numeric is emitted bare is decided by the
//! configured [`LiteralPolicy`].
//!
//! A string of the form `:identifier` is a parameter reference and is always
//! emitted verbatim, so a model compiled into a template keeps its
//! placeholders.

use once_cell::sync::Lazy;
use querycraft_core::LiteralPolicy;
use regex::Regex;

use crate::value::Value;

static CANONICAL_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?(0|[1-9]\d*)(\.\d+)?$").expect("valid regex"));

static PARAMETER_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^:[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

/// Wraps `text` in single quotes, doubling embedded quotes.
///
/// # Examples
///
/// ```
/// use querycraft_builder::query::literal::quote;
///
/// assert_eq!(quote("O'Brien"), "'O''Brien'");
/// ```
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Returns `true` if `text` is a `:name` parameter reference.
pub fn is_parameter_reference(text: &str) -> bool {
    PARAMETER_REFERENCE.is_match(text)
}

/// Returns `true` if `text` is emitted bare under `policy`.
pub fn looks_numeric(text: &str, policy: LiteralPolicy) -> bool {
    match policy {
        LiteralPolicy::AlwaysQuote => false,
        LiteralPolicy::Strict => CANONICAL_NUMBER.is_match(text),
        LiteralPolicy::Permissive => {
            let trimmed = text.trim();
            !trimmed.is_empty()
                && trimmed
                    .chars()
                    .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
                && trimmed.parse::<f64>().is_ok()
        }
    }
}

/// Renders user-entered text: a parameter reference verbatim, a numeric
/// string bare, anything else quoted.
///
/// # Examples
///
/// ```
/// use querycraft_builder::query::literal::render_text;
/// use querycraft_core::LiteralPolicy;
///
/// assert_eq!(render_text("42", LiteralPolicy::Permissive), "42");
/// assert_eq!(render_text("007", LiteralPolicy::Permissive), "007");
/// assert_eq!(render_text("007", LiteralPolicy::Strict), "'007'");
/// assert_eq!(render_text("active", LiteralPolicy::Strict), "'active'");
/// assert_eq!(render_text(":status", LiteralPolicy::AlwaysQuote), ":status");
/// ```
pub fn render_text(text: &str, policy: LiteralPolicy) -> String {
    if is_parameter_reference(text) {
        text.to_string()
    } else if looks_numeric(text, policy) {
        text.trim().to_string()
    } else {
        quote(text)
    }
}

/// Renders a value as a SQL literal.
///
/// Lists render as their comma-separated elements, without parentheses.
pub fn render_value(value: &Value, policy: LiteralPolicy) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) if f.is_finite() => f.to_string(),
        Value::Float(f) => quote(&f.to_string()),
        Value::String(s) => render_text(s, policy),
        Value::Date(d) => quote(&d.format("%Y-%m-%d").to_string()),
        Value::DateTime(dt) => quote(&dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        Value::List(items) => items
            .iter()
            .map(|v| render_value(v, policy))
            .collect::<Vec<_>>()
            .join(", "),
    }
}
