//! Settings for the querycraft engine.
//!
//! This module provides the [`Settings`] struct, which holds all engine
//! configuration with sensible defaults. Settings are grouped by concern:
//! SQL compilation, preview debouncing, execution/polling, and relationship
//! suggestions.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How the compiler decides whether a literal is emitted bare or quoted.
///
/// The numeric-looking test is a heuristic that can drop quoting from
/// phone numbers or zero-padded codes, so the policy is configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralPolicy {
    /// Anything that parses as a number is emitted bare (`"007"` becomes `007`).
    #[default]
    Permissive,
    /// Only canonical numbers are emitted bare; leading zeros, a leading `+`
    /// and surrounding whitespace keep the value quoted.
    Strict,
    /// Every string value is quoted.
    AlwaysQuote,
}

impl fmt::Display for LiteralPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permissive => write!(f, "permissive"),
            Self::Strict => write!(f, "strict"),
            Self::AlwaysQuote => write!(f, "always_quote"),
        }
    }
}

impl FromStr for LiteralPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "permissive" => Ok(Self::Permissive),
            "strict" => Ok(Self::Strict),
            "always_quote" | "always-quote" | "quote" => Ok(Self::AlwaysQuote),
            other => Err(format!("unknown literal policy '{other}'")),
        }
    }
}

/// What the compiler does when the same two tables are joined more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateJoinPolicy {
    /// Emit every join; duplicates are legitimate (e.g. composite keys).
    #[default]
    Allow,
    /// Emit every join but attach a warning to the compile result.
    Warn,
    /// Treat a duplicate table pair as a compile error.
    Reject,
}

/// SQL compiler configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerSettings {
    /// Literal quoting policy for scalar and list values.
    pub literal_policy: LiteralPolicy,
    /// Handling of repeated table pairs in the join list.
    pub duplicate_joins: DuplicateJoinPolicy,
}

/// Debounced preview configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewSettings {
    /// Quiet interval, in milliseconds, before a preview recompile fires.
    pub debounce_ms: u64,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self { debounce_ms: 400 }
    }
}

/// Query execution and status polling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// Rows per result page requested from the execution service.
    pub page_size: u32,
    /// Server-side timeout passed along with each execution request.
    pub timeout_ms: u64,
    /// Delay between two status polls.
    pub poll_interval_ms: u64,
    /// Maximum number of status polls before giving up with a timeout.
    pub max_poll_attempts: u32,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            timeout_ms: 30_000,
            poll_interval_ms: 1_000,
            max_poll_attempts: 30,
        }
    }
}

/// Relationship suggestion configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionSettings {
    /// Whether the top-ranked suggestion fills unset join columns.
    pub auto_apply: bool,
    /// Suggestions below this confidence are dropped.
    pub min_confidence: f64,
}

impl Default for SuggestionSettings {
    fn default() -> Self {
        Self {
            auto_apply: true,
            min_confidence: 0.0,
        }
    }
}

/// The complete set of engine settings.
///
/// # Examples
///
/// ```
/// use querycraft_core::settings::{LiteralPolicy, Settings};
///
/// let settings = Settings::default();
/// assert!(settings.debug);
/// assert_eq!(settings.compiler.literal_policy, LiteralPolicy::Permissive);
/// assert_eq!(settings.preview.debounce_ms, 400);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    // ── Core ─────────────────────────────────────────────────────────

    /// Whether debug mode is enabled (pretty logs instead of JSON).
    pub debug: bool,
    /// The log level filter (e.g. "info", "debug", "querycraft_builder=trace").
    pub log_level: String,
    /// The data source queries are executed against.
    pub data_source_id: String,

    // ── Engine ───────────────────────────────────────────────────────

    /// SQL compiler configuration.
    pub compiler: CompilerSettings,
    /// Debounced preview configuration.
    pub preview: PreviewSettings,
    /// Execution and polling configuration.
    pub execution: ExecutionSettings,
    /// Relationship suggestion configuration.
    pub suggestion: SuggestionSettings,

    // ── Escape hatch ─────────────────────────────────────────────────

    /// Custom settings that don't fit into the above categories.
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: true,
            log_level: "info".to_string(),
            data_source_id: "default".to_string(),
            compiler: CompilerSettings::default(),
            preview: PreviewSettings::default(),
            execution: ExecutionSettings::default(),
            suggestion: SuggestionSettings::default(),
            extra: HashMap::new(),
        }
    }
}
