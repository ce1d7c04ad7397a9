//! Logging setup for botty applications.
//!
//! Built on `tracing-subscriber`. Every update is handled inside a
//! `handle_update` span, with `invoke` and `dispatch` spans below it; span
//! events make those visible without extra instrumentation.
//!
//! ```rust,ignore
//! let config = botty_runtime::config::load_config()?;
//! botty_runtime::logging::init_from_config(&config.logging);
//!
//! // or, without a config file:
//! LoggingBuilder::new()
//!     .directive("botty_framework=debug")
//!     .span_events(SpanEvents::Lifecycle)
//!     .init();
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::warn;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogFormat, LogLevel, LogOutput, LoggingConfig, SpanEventConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Span lifecycle presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanEvents {
    None,
    /// Creation and close; shows how long each update took.
    Lifecycle,
    /// Enter and exit; shows every resumption of a suspended handler.
    Active,
    Full,
}

impl From<SpanEvents> for SpanEventConfig {
    fn from(events: SpanEvents) -> Self {
        let (new, enter, exit, close) = match events {
            SpanEvents::None => (false, false, false, false),
            SpanEvents::Lifecycle => (true, false, false, true),
            SpanEvents::Active => (false, true, true, false),
            SpanEvents::Full => (true, true, true, true),
        };
        Self {
            new,
            enter,
            exit,
            close,
        }
    }
}

fn fmt_span(events: SpanEventConfig) -> FmtSpan {
    [
        (events.new, FmtSpan::NEW),
        (events.enter, FmtSpan::ENTER),
        (events.exit, FmtSpan::EXIT),
        (events.close, FmtSpan::CLOSE),
    ]
    .into_iter()
    .filter(|(enabled, _)| *enabled)
    .fold(FmtSpan::NONE, |acc, (_, span)| acc | span)
}

/// Installs the subscriber described by `config`.
///
/// Does nothing if a global subscriber is already installed.
pub fn init_from_config(config: &LoggingConfig) {
    let _ = LoggingBuilder::from_config(config).try_init();
}

/// Builds and installs the global `tracing` subscriber.
///
/// Starts from a [`LoggingConfig`] and layers extra filter directives on top.
/// `RUST_LOG`, when set, replaces the configured base level.
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    config: LoggingConfig,
    directives: Vec<String>,
    with_target: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::from_config(&LoggingConfig::default())
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut targets: Vec<_> = config.filters.iter().collect();
        targets.sort_by_key(|(target, _)| target.as_str());
        Self {
            config: config.clone(),
            directives: targets
                .into_iter()
                .map(|(target, level)| format!("{target}={}", level.as_str()))
                .collect(),
            with_target: true,
        }
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    /// Adds a filter directive such as `botty_framework::dispatcher=trace`.
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    pub fn span_events(mut self, events: impl Into<SpanEventConfig>) -> Self {
        self.config.span_events = events.into();
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.config.output = output;
        self
    }

    /// Writes to `path`, which is opened in append mode.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output = LogOutput::File;
        self.config.file_path = Some(path.into());
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.config.thread_ids = enabled;
        self
    }

    /// Includes source file and line of each event.
    pub fn with_file_location(mut self, enabled: bool) -> Self {
        self.config.file_location = enabled;
        self
    }

    pub fn init(self) {
        let _ = self.try_init();
    }

    /// Installs the global subscriber, failing if one is already set.
    ///
    /// Invalid directives and unavailable formats are reported through
    /// `warn!` once the subscriber is live.
    pub fn try_init(self) -> Result<(), TryInitError> {
        let mut problems = Vec::new();
        let filter = self.filter(&mut problems);
        let writer = self.writer(&mut problems);
        let layer = self.layer(writer, &mut problems);

        tracing_subscriber::registry()
            .with(layer)
            .with(filter)
            .try_init()?;

        for problem in problems {
            warn!("{problem}");
        }
        Ok(())
    }

    fn filter(&self, problems: &mut Vec<String>) -> EnvFilter {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.config.level.as_str()));
        for directive in &self.directives {
            match directive.parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => problems.push(format!("Ignoring log directive {directive:?}: {e}")),
            }
        }
        filter
    }

    fn writer(&self, problems: &mut Vec<String>) -> BoxMakeWriter {
        match (self.config.output, &self.config.file_path) {
            (LogOutput::Stdout, _) => BoxMakeWriter::new(std::io::stdout),
            (LogOutput::Stderr, _) => BoxMakeWriter::new(std::io::stderr),
            (LogOutput::File, Some(path)) => BoxMakeWriter::new(tracing_appender::rolling::never(
                path.parent().unwrap_or_else(|| Path::new(".")),
                path.file_name().unwrap_or_else(|| OsStr::new("botty.log")),
            )),
            (LogOutput::File, None) => {
                problems.push("File output has no path; logging to stdout".to_string());
                BoxMakeWriter::new(std::io::stdout)
            }
        }
    }

    fn layer(&self, writer: BoxMakeWriter, problems: &mut Vec<String>) -> BoxedLayer {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_span_events(fmt_span(self.config.span_events))
            .with_target(self.with_target)
            .with_thread_ids(self.config.thread_ids)
            .with_file(self.config.file_location)
            .with_line_number(self.config.file_location);

        match self.config.format {
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
            #[cfg(feature = "json-log")]
            LogFormat::Json => layer.json().boxed(),
            #[cfg(not(feature = "json-log"))]
            LogFormat::Json => {
                problems.push("JSON logs need the `json-log` feature; using the full format".into());
                layer.boxed()
            }
            LogFormat::Full => layer.boxed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_event_presets() {
        assert_eq!(fmt_span(SpanEvents::None.into()), FmtSpan::NONE);
        assert_eq!(
            fmt_span(SpanEvents::Lifecycle.into()),
            FmtSpan::NEW | FmtSpan::CLOSE
        );
        assert_eq!(fmt_span(SpanEvents::Full.into()), FmtSpan::FULL);
    }

    #[test]
    fn test_from_config_sorts_filters() {
        let mut config = LoggingConfig {
            level: LogLevel::Debug,
            ..Default::default()
        };
        config.filters.insert("hyper".into(), LogLevel::Warn);
        config
            .filters
            .insert("botty_framework".into(), LogLevel::Trace);

        let builder = LoggingBuilder::from_config(&config).directive("tower=error");
        assert_eq!(
            builder.directives,
            ["botty_framework=trace", "hyper=warn", "tower=error"]
        );
        assert_eq!(builder.config.level, LogLevel::Debug);
    }

    #[test]
    fn test_bad_directive_is_reported() {
        let mut problems = Vec::new();
        LoggingBuilder::new()
            .directive("botty=loud")
            .filter(&mut problems);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("botty=loud"), "{}", problems[0]);
    }

    #[test]
    fn test_file_output_without_path_falls_back() {
        let mut problems = Vec::new();
        LoggingBuilder::new()
            .output(LogOutput::File)
            .writer(&mut problems);
        assert_eq!(problems.len(), 1);

        problems.clear();
        let dir = tempfile::tempdir().unwrap();
        LoggingBuilder::new()
            .file(dir.path().join("bot.log"))
            .writer(&mut problems);
        assert!(problems.is_empty());
    }
}
