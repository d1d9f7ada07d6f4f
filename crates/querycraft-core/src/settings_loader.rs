//! Reading [`Settings`] from files and the environment.
//!
//! Settings are layered: defaults first, then a TOML or JSON file merged key
//! by key, then `QUERYCRAFT_*` variables, which win.
//!
//! ## Environment variables
//!
//! | Env Var | Setting |
//! |---|---|
//! | `QUERYCRAFT_DEBUG` | `debug` |
//! | `QUERYCRAFT_LOG_LEVEL` | `log_level` |
//! | `QUERYCRAFT_DATA_SOURCE` | `data_source_id` |
//! | `QUERYCRAFT_LITERAL_POLICY` | `compiler.literal_policy` |
//! | `QUERYCRAFT_DEBOUNCE_MS` | `preview.debounce_ms` |
//! | `QUERYCRAFT_PAGE_SIZE` | `execution.page_size` |
//! | `QUERYCRAFT_TIMEOUT_MS` | `execution.timeout_ms` |
//! | `QUERYCRAFT_POLL_INTERVAL_MS` | `execution.poll_interval_ms` |
//! | `QUERYCRAFT_MAX_POLL_ATTEMPTS` | `execution.max_poll_attempts` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use querycraft_core::settings_loader;
//!
//! // Load from TOML
//! let settings = settings_loader::from_toml_file("config/querycraft.toml").unwrap();
//!
//! // Load from JSON with environment overrides
//! let settings = settings_loader::from_json_file_with_env("config/querycraft.json").unwrap();
//! ```

use std::path::Path;
use std::str::FromStr;

use serde_json::Value as Json;

use crate::error::QueryCraftError;
use crate::settings::{LiteralPolicy, Settings};

#[derive(Debug, Clone, Copy)]
enum Format {
    Toml,
    Json,
}

impl Format {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }

    fn parse(self, text: &str) -> Result<Json, String> {
        match self {
            Self::Toml => toml::from_str(text).map_err(|e| e.to_string()),
            Self::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
        }
    }

    /// Parses `text` and lays it over the defaults, so nested tables only
    /// need the keys they change.
    fn load_str(self, text: &str) -> Result<Settings, QueryCraftError> {
        let layer = self.parse(text).map_err(|e| {
            QueryCraftError::ConfigurationError(format!("invalid {} settings: {e}", self.label()))
        })?;
        let mut merged = serde_json::to_value(Settings::default())?;
        overlay(&mut merged, layer);
        serde_json::from_value(merged).map_err(|e| {
            QueryCraftError::ConfigurationError(format!("{} settings do not fit: {e}", self.label()))
        })
    }

    fn load_file(self, path: &Path) -> Result<Settings, QueryCraftError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            QueryCraftError::ConfigurationError(format!(
                "cannot read {} settings '{}': {e}",
                self.label(),
                path.display()
            ))
        })?;
        self.load_str(&text)
    }
}

/// Recursively replaces keys of `base` with those of `layer`. Objects merge,
/// every other value is replaced outright.
fn overlay(base: &mut Json, layer: Json) {
    match (base, layer) {
        (Json::Object(base), Json::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, layer) => *slot = layer,
    }
}

fn with_env(mut settings: Settings) -> Settings {
    apply_env_overrides(&mut settings);
    settings
}

/// Parses TOML settings. Missing keys keep their defaults.
///
/// # Errors
///
/// Returns [`QueryCraftError::ConfigurationError`] for malformed TOML or
/// values of the wrong shape.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, QueryCraftError> {
    Format::Toml.load_str(toml_str)
}

/// Reads TOML settings from `path`.
///
/// # Errors
///
/// Returns [`QueryCraftError::ConfigurationError`] if the file is unreadable
/// or invalid.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, QueryCraftError> {
    Format::Toml.load_file(path.as_ref())
}

/// Reads TOML settings from `path`, then applies the environment.
///
/// # Errors
///
/// See [`from_toml_file`].
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, QueryCraftError> {
    from_toml_file(path).map(with_env)
}

/// Parses JSON settings. Missing keys keep their defaults.
///
/// # Errors
///
/// Returns [`QueryCraftError::ConfigurationError`] for malformed JSON or
/// values of the wrong shape.
pub fn from_json_str(json_str: &str) -> Result<Settings, QueryCraftError> {
    Format::Json.load_str(json_str)
}

/// Reads JSON settings from `path`.
///
/// # Errors
///
/// Returns [`QueryCraftError::ConfigurationError`] if the file is unreadable
/// or invalid.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Settings, QueryCraftError> {
    Format::Json.load_file(path.as_ref())
}

/// Reads JSON settings from `path`, then applies the environment.
///
/// # Errors
///
/// See [`from_json_file`].
pub fn from_json_file_with_env(path: impl AsRef<Path>) -> Result<Settings, QueryCraftError> {
    from_json_file(path).map(with_env)
}

/// Reads settings from `path`, choosing JSON for a `.json` extension and
/// TOML otherwise, then applies the environment.
///
/// # Errors
///
/// Returns [`QueryCraftError::ConfigurationError`] if the file is unreadable
/// or invalid.
pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Settings, QueryCraftError> {
    let path = path.as_ref();
    Format::of(path).load_file(path).map(with_env)
}

/// Defaults plus the environment.
pub fn from_env() -> Settings {
    with_env(Settings::default())
}

/// Overrides fields from `QUERYCRAFT_*` variables.
///
/// A variable that does not parse (say a non-numeric `QUERYCRAFT_PAGE_SIZE`)
/// leaves the field alone.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Some(flag) = env("QUERYCRAFT_DEBUG") {
        settings.debug = matches!(flag.to_lowercase().as_str(), "true" | "1" | "yes" | "on");
    }
    if let Some(level) = env("QUERYCRAFT_LOG_LEVEL") {
        settings.log_level = level;
    }
    if let Some(source) = env("QUERYCRAFT_DATA_SOURCE") {
        settings.data_source_id = source;
    }
    env_parsed::<LiteralPolicy>("QUERYCRAFT_LITERAL_POLICY", &mut settings.compiler.literal_policy);
    env_parsed("QUERYCRAFT_DEBOUNCE_MS", &mut settings.preview.debounce_ms);

    let execution = &mut settings.execution;
    env_parsed("QUERYCRAFT_PAGE_SIZE", &mut execution.page_size);
    env_parsed("QUERYCRAFT_TIMEOUT_MS", &mut execution.timeout_ms);
    env_parsed("QUERYCRAFT_POLL_INTERVAL_MS", &mut execution.poll_interval_ms);
    env_parsed("QUERYCRAFT_MAX_POLL_ATTEMPTS", &mut execution.max_poll_attempts);
}

fn env(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

fn env_parsed<T: FromStr>(var: &str, target: &mut T) {
    if let Some(parsed) = env(var).and_then(|raw| raw.trim().parse().ok()) {
        *target = parsed;
    }
}
