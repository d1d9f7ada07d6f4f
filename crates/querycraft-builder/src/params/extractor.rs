//! Parameter detection in free-form SQL.
//!
//! Two placeholder syntaxes are recognised:
//!
//! - **named** `:identifier` tokens; duplicates collapse to one descriptor and
//!   first occurrence defines the order;
//! - **positional** bare `?` tokens, named `param1`, `param2`, ... left to
//!   right.
//!
//! Both passes run over the same text and their results are merged in order
//! of appearance. Quoted literals, quoted identifiers and comments are masked
//! out first, so `'10:30'`, `-- :note` and `"a?b"` produce no tokens. A
//! `::type` cast is not a parameter, and neither are the PostgreSQL `?|` and
//! `?&` operators.
//!
//! Each parameter's type is guessed from a window of up to 50 characters on
//! either side of its first occurrence (see [`extract_parameters`]). The guess
//! is a heuristic; descriptors carry a `type_locked` flag so a user override
//! survives re-extraction.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::value::{Value, ValueType};

/// The characters of context examined on each side of a token.
const WINDOW: usize = 50;

/// Stands in for the token itself inside its context window.
const SLOT: &str = "qc_param_slot";

static NAMED_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex"));

static DATE_CONTEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        \b(?:\w+_)?(?:date|time|timestamp|datetime|day|month|year|at|on)\s*(?:=|!=|<>|<=|>=|<|>)\s*qc_param_slot
        | \b(?:\w+_)?(?:date|time|timestamp|datetime|day|month|year|at|on)\s+(?:not\s+)?between\s+(?:\S+\s+and\s+)?qc_param_slot
        | \b(?:date|timestamp|time)\s+qc_param_slot
        | \b(?:to_date|to_timestamp|date_trunc|date)\s*\([^()]*qc_param_slot
        | qc_param_slot\s*::\s*(?:date|timestamptz|timestamp|time)\b
        ",
    )
    .expect("valid regex")
});

static NUMERIC_CONTEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        (?:^|[^<])(?:<=|>=|<|>)\s*qc_param_slot
        | \b(?:limit|offset|top)\s+qc_param_slot
        | [-+*/%]\s*qc_param_slot
        | \b(?:\w+_)?(?:id|count|amount|price|total|qty|quantity|age|num|number|size|score|rank)\s*(?:=|!=|<>)\s*qc_param_slot
        | \b(?:\w+_)?(?:id|count|amount|price|total|qty|quantity|age|num|number|size|score|rank)\s+(?:not\s+)?between\s+(?:\S+\s+and\s+)?qc_param_slot
        | qc_param_slot\s*::\s*(?:int|integer|bigint|smallint|numeric|decimal|float|real|double)\b
        ",
    )
    .expect("valid regex")
});

static BOOLEAN_CONTEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        \bis\s+(?:not\s+)?qc_param_slot
        | \b(?:is|has|can|should|allow)_\w+\s*(?:=|!=|<>)\s*qc_param_slot
        | \b(?:\w+_)?(?:active|enabled|disabled|deleted|verified|visible|archived|flag)\s*(?:=|!=|<>)\s*qc_param_slot
        | qc_param_slot\s*::\s*bool(?:ean)?\b
        ",
    )
    .expect("valid regex")
});

static LIST_CONTEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        \bin\s*\(\s*(?:[^()]*,\s*)?qc_param_slot
        | \b(?:any|all)\s*\(\s*qc_param_slot
        | qc_param_slot\s*::\s*\w+\[\]
        ",
    )
    .expect("valid regex")
});

/// How a parameter appears in the SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    /// `:name`
    Named,
    /// `?`
    Positional,
}

/// A detected parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDescriptor {
    /// The token name, or `paramN` for positional tokens.
    pub name: String,
    /// The inferred (or user-chosen) type.
    #[serde(rename = "type")]
    pub param_type: ValueType,
    /// Whether a value must be supplied.
    #[serde(default = "default_required")]
    pub required: bool,
    /// The value used when none is supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    /// The placeholder syntax.
    pub kind: ParameterKind,
    /// Set when the user overrode the inferred type.
    #[serde(default)]
    pub type_locked: bool,
}

const fn default_required() -> bool {
    true
}

impl ParameterDescriptor {
    /// Creates a required descriptor with no default.
    pub fn new(name: impl Into<String>, param_type: ValueType, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: true,
            default_value: None,
            kind,
            type_locked: false,
        }
    }

    /// Overrides the inferred type and locks it against re-inference.
    pub fn with_type(mut self, param_type: ValueType) -> Self {
        self.param_type = param_type;
        self.type_locked = true;
        self
    }

    /// Marks the parameter optional with the given default.
    pub fn optional(mut self, default_value: Option<Value>) -> Self {
        self.required = false;
        self.default_value = default_value;
        self
    }
}

/// One placeholder occurrence, with byte offsets into the original SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamToken {
    /// Byte offset of the first character of the token.
    pub start: usize,
    /// Byte offset one past the token.
    pub end: usize,
    /// The parameter name (`paramN` for positional tokens).
    pub name: String,
    /// The placeholder syntax.
    pub kind: ParameterKind,
}

/// Replaces the contents of quoted literals, quoted identifiers and comments
/// with spaces. The result has the same byte length as `sql`, so offsets
/// found in it are valid in `sql`.
pub fn mask_sql(sql: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        Literal,
        Identifier,
        LineComment,
        BlockComment,
    }

    fn blank(out: &mut String, c: char) {
        out.extend(std::iter::repeat(' ').take(c.len_utf8()));
    }

    let mut out = String::with_capacity(sql.len());
    let mut state = State::Code;
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '\'' => {
                    state = State::Literal;
                    out.push(c);
                }
                '"' => {
                    state = State::Identifier;
                    out.push(c);
                }
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = State::LineComment;
                    out.push_str("  ");
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = State::BlockComment;
                    out.push_str("  ");
                }
                _ => out.push(c),
            },
            State::Literal | State::Identifier => {
                let delimiter = if state == State::Literal { '\'' } else { '"' };
                if c == delimiter {
                    if chars.peek() == Some(&delimiter) {
                        chars.next();
                        out.push_str("  ");
                    } else {
                        state = State::Code;
                        out.push(c);
                    }
                } else {
                    blank(&mut out, c);
                }
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                    out.push(c);
                } else {
                    blank(&mut out, c);
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Code;
                    out.push_str("  ");
                } else if c == '\n' {
                    out.push(c);
                } else {
                    blank(&mut out, c);
                }
            }
        }
    }
    out
}

/// Finds every placeholder occurrence in `sql`, in order of appearance.
pub fn scan_tokens(sql: &str) -> Vec<ParamToken> {
    scan_masked(&mask_sql(sql))
}

fn scan_masked(masked: &str) -> Vec<ParamToken> {
    let mut tokens: Vec<ParamToken> = NAMED_TOKEN
        .captures_iter(masked)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let previous = masked[..whole.start()].chars().next_back();
            if matches!(previous, Some(c) if c == ':' || c == '_' || c.is_alphanumeric()) {
                return None;
            }
            Some(ParamToken {
                start: whole.start(),
                end: whole.end(),
                name: caps.get(1)?.as_str().to_string(),
                kind: ParameterKind::Named,
            })
        })
        .collect();

    let bytes = masked.as_bytes();
    let mut positional = 0;
    for (index, byte) in bytes.iter().enumerate() {
        if *byte != b'?' || matches!(bytes.get(index + 1), Some(b'|' | b'&')) {
            continue;
        }
        positional += 1;
        tokens.push(ParamToken {
            start: index,
            end: index + 1,
            name: format!("param{positional}"),
            kind: ParameterKind::Positional,
        });
    }

    tokens.sort_by_key(|t| t.start);
    tokens
}

/// Detects the parameters of `sql`.
///
/// The result is a pure function of the text: running it twice on the same
/// SQL yields identical descriptors in identical order.
///
/// Types are inferred from the token's surroundings, testing in priority
/// order for date/time context, numeric or ordering-comparison context,
/// boolean context and `IN (...)` list context. When none matches, a named
/// token's own name is consulted (`startDate`, `userId`, `isActive`,
/// `orderIds`). The fallback is `string`.
///
/// # Examples
///
/// ```
/// use querycraft_builder::params::extract_parameters;
/// use querycraft_builder::value::ValueType;
///
/// let params = extract_parameters(
///     "SELECT * FROM users WHERE id = :userId AND status IN (:statuses) AND created_at > :startDate",
/// );
/// let summary: Vec<(&str, ValueType)> =
///     params.iter().map(|p| (p.name.as_str(), p.param_type)).collect();
/// assert_eq!(
///     summary,
///     vec![
///         ("userId", ValueType::Number),
///         ("statuses", ValueType::Array),
///         ("startDate", ValueType::Date),
///     ]
/// );
/// ```
pub fn extract_parameters(sql: &str) -> Vec<ParameterDescriptor> {
    let masked = mask_sql(sql);
    let mut descriptors: Vec<ParameterDescriptor> = Vec::new();
    for token in scan_masked(&masked) {
        if descriptors.iter().any(|d| d.name == token.name) {
            continue;
        }
        let param_type = infer_param_type(&masked, &token);
        descriptors.push(ParameterDescriptor::new(token.name, param_type, token.kind));
    }
    descriptors
}

/// Re-extracts parameters after the SQL changed, carrying user state over.
///
/// A descriptor whose name survives keeps its `required` flag and default
/// value, and keeps its type when that type was locked by the user.
/// Descriptors whose names disappeared are dropped.
pub fn reextract(sql: &str, previous: &[ParameterDescriptor]) -> Vec<ParameterDescriptor> {
    extract_parameters(sql)
        .into_iter()
        .map(|mut fresh| {
            if let Some(old) = previous.iter().find(|p| p.name == fresh.name) {
                fresh.required = old.required;
                fresh.default_value.clone_from(&old.default_value);
                if old.type_locked {
                    fresh.param_type = old.param_type;
                    fresh.type_locked = true;
                }
            }
            fresh
        })
        .collect()
}

fn context_window(masked: &str, token: &ParamToken) -> String {
    let mut before: Vec<char> = masked[..token.start].chars().rev().take(WINDOW).collect();
    before.reverse();
    let after: String = masked[token.end..].chars().take(WINDOW).collect();
    let before: String = before.into_iter().collect();
    format!("{before}{SLOT}{after}").to_lowercase()
}

fn infer_param_type(masked: &str, token: &ParamToken) -> ValueType {
    let context = context_window(masked, token);
    if DATE_CONTEXT.is_match(&context) {
        ValueType::Date
    } else if NUMERIC_CONTEXT.is_match(&context) {
        ValueType::Number
    } else if BOOLEAN_CONTEXT.is_match(&context) {
        ValueType::Boolean
    } else if LIST_CONTEXT.is_match(&context) {
        ValueType::Array
    } else if token.kind == ParameterKind::Named {
        type_from_name(&token.name)
    } else {
        ValueType::String
    }
}

/// Splits `startDate` / `start_date` into lowercase words.
fn name_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut previous_lower = false;
    for c in name.chars() {
        if c == '_' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            previous_lower = false;
            continue;
        }
        if c.is_uppercase() && previous_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        previous_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn type_from_name(name: &str) -> ValueType {
    let words = name_words(name);
    let first = words.first().map_or("", String::as_str);
    let last = words.last().map_or("", String::as_str);
    match (first, last) {
        (_, "date" | "time" | "timestamp" | "datetime" | "at" | "day" | "month" | "year" | "since" | "until") => {
            ValueType::Date
        }
        (_, "id" | "count" | "limit" | "offset" | "amount" | "price" | "total" | "qty" | "quantity" | "age"
        | "num" | "number" | "size" | "page" | "min" | "max") => ValueType::Number,
        ("is" | "has" | "can" | "should" | "include", _) | (_, "flag" | "enabled" | "active") => {
            ValueType::Boolean
        }
        (_, "ids" | "list" | "values") => ValueType::Array,
        _ => ValueType::String,
    }
}
