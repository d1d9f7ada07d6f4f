//! The `check` command.
//!
//! Inspects the loaded settings for values that would make the engine
//! misbehave at runtime: a poll loop that never waits or never runs, a
//! preview that recompiles on every keystroke or never, and so on.

use async_trait::async_trait;
use querycraft_core::{QueryCraftError, QueryCraftResult, Settings};
use serde::Serialize;

use crate::command::ManagementCommand;

/// Debounce intervals outside this range are flagged.
const DEBOUNCE_RANGE_MS: std::ops::RangeInclusive<u64> = 50..=5000;

/// Validates the engine configuration.
pub struct CheckCommand;

/// One finding of [`run_checks`].
#[derive(Debug, Clone, Serialize)]
pub struct CheckMessage {
    /// Severity.
    pub level: CheckLevel,
    /// What is wrong.
    pub msg: String,
    /// How to fix it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Stable identifier, e.g. "execution.E001".
    pub id: String,
}

/// Severity of a [`CheckMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckLevel {
    /// Informational.
    Info,
    /// Works, but probably not as intended.
    Warning,
    /// Breaks execution or preview.
    Error,
    /// Nothing can run.
    Critical,
}

impl std::fmt::Display for CheckLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl CheckMessage {
    fn new(level: CheckLevel, id: &str, msg: impl Into<String>, hint: &str) -> Self {
        Self {
            level,
            msg: msg.into(),
            hint: Some(hint.to_string()),
            id: id.to_string(),
        }
    }
}

/// Runs every configuration check against `settings`.
pub fn run_checks(settings: &Settings) -> Vec<CheckMessage> {
    let mut messages = Vec::new();
    let execution = &settings.execution;

    if execution.poll_interval_ms == 0 {
        messages.push(CheckMessage::new(
            CheckLevel::Error,
            "execution.E001",
            "poll_interval_ms is 0",
            "Status polling would spin without waiting; use at least a few hundred milliseconds",
        ));
    }

    if execution.max_poll_attempts == 0 {
        messages.push(CheckMessage::new(
            CheckLevel::Error,
            "execution.E002",
            "max_poll_attempts is 0",
            "Every execution would time out before its first status check",
        ));
    }

    if execution.page_size == 0 {
        messages.push(CheckMessage::new(
            CheckLevel::Error,
            "execution.E003",
            "page_size is 0",
            "Set a positive page size",
        ));
    }

    if !DEBOUNCE_RANGE_MS.contains(&settings.preview.debounce_ms) {
        messages.push(CheckMessage::new(
            CheckLevel::Warning,
            "preview.W001",
            format!(
                "debounce_ms is {}, outside {}..={}",
                settings.preview.debounce_ms,
                DEBOUNCE_RANGE_MS.start(),
                DEBOUNCE_RANGE_MS.end()
            ),
            "Previews either recompile on every edit or feel unresponsive",
        ));
    }

    let confidence = settings.suggestion.min_confidence;
    if !(0.0..=1.0).contains(&confidence) {
        messages.push(CheckMessage::new(
            CheckLevel::Error,
            "suggestion.E001",
            format!("min_confidence is {confidence}, outside [0, 1]"),
            "Confidence scores range from 0 to 1",
        ));
    }

    if settings.data_source_id.trim().is_empty() {
        messages.push(CheckMessage::new(
            CheckLevel::Warning,
            "core.W001",
            "data_source_id is empty",
            "Metadata, suggestion and execution calls need a data source",
        ));
    }

    messages
}

#[async_trait]
impl ManagementCommand for CheckCommand {
    fn name(&self) -> &'static str {
        "check"
    }

    fn help(&self) -> &'static str {
        "Check the engine configuration"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("json")
                .long("json")
                .action(clap::ArgAction::SetTrue)
                .help("Print findings as JSON"),
        )
    }

    async fn handle(&self, matches: &clap::ArgMatches, settings: &Settings) -> QueryCraftResult<()> {
        let messages = run_checks(settings);
        let errors = messages.iter().filter(|m| m.level >= CheckLevel::Error).count();

        if matches.get_flag("json") {
            println!("{}", serde_json::to_string_pretty(&messages)?);
        } else if messages.is_empty() {
            tracing::info!("Configuration check identified no issues");
        } else {
            for msg in &messages {
                let hint = msg.hint.as_ref().map_or(String::new(), |h| format!("\n\tHINT: {h}"));
                tracing::warn!("{} ({}): {}{}", msg.level, msg.id, msg.msg, hint);
            }
            tracing::info!(
                "Configuration check identified {} issue(s) ({} error(s))",
                messages.len(),
                errors
            );
        }

        if errors > 0 {
            return Err(QueryCraftError::ConfigurationError(format!(
                "configuration check found {errors} error(s)"
            )));
        }
        Ok(())
    }
}
