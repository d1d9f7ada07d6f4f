//! Tracing setup and session spans.
//!
//! Log output always goes to stderr so that command output on stdout stays
//! machine-readable.

use crate::settings::Settings;

/// Installs the process-wide subscriber described by `settings`.
///
/// `log_level` is an `EnvFilter` directive such as `"info"` or
/// `"querycraft_builder=trace"`; an unparsable directive falls back to
/// `info`. Debug mode prints pretty multi-line events with source locations,
/// otherwise each event is one JSON object. Later calls leave the first
/// subscriber in place.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // Err only means a subscriber is already installed.
    let _ = if settings.debug {
        builder
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
    } else {
        builder.json().try_init()
    };
}

/// Span wrapping the work of one builder session.
///
/// Events recorded inside it carry the session and data source ids.
///
/// # Examples
///
/// ```
/// use querycraft_core::logging::session_span;
///
/// let span = session_span("3f2c", "warehouse");
/// let _guard = span.enter();
/// tracing::info!("compiling preview");
/// ```
pub fn session_span(session_id: &str, data_source_id: &str) -> tracing::Span {
    tracing::info_span!("builder_session", id = session_id, data_source = data_source_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_logging_twice_is_harmless() {
        let mut settings = Settings::default();
        settings.log_level = "not a [valid filter".to_string();
        setup_logging(&settings);
        settings.debug = false;
        setup_logging(&settings);
    }

    #[test]
    fn test_session_span_enter() {
        let span = session_span("abc", "default");
        let _guard = span.enter();
        tracing::debug!("inside session span");
    }
}
