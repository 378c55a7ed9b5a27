//! Logging setup on `tracing-subscriber`.
//!
//! Every bridged call runs inside a `bridge_call` span carrying the operation
//! name; enabling span events makes the path each call took visible without
//! raising the level to `debug`.
//!
//! ```rust,ignore
//! use ntbridge_runtime::logging::{LoggingBuilder, SpanEvents};
//!
//! LoggingBuilder::new()
//!     .with_level(tracing::Level::INFO)
//!     .directive("ntbridge_core=debug")
//!     .span_events(SpanEvents::LIFECYCLE)
//!     .init();
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::warn;
use tracing_appender::rolling;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogFormat, LogOutput, LogRotation, LoggingConfig, SpanEventConfig};

/// Span lifecycle events to log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanEvents {
    /// Log when a span is created.
    pub new: bool,
    /// Log when a span closes, with its busy/idle time.
    pub close: bool,
}

impl SpanEvents {
    pub const NONE: Self = Self {
        new: false,
        close: false,
    };

    /// Creation and close of each span.
    pub const LIFECYCLE: Self = Self {
        new: true,
        close: true,
    };

    fn to_fmt_span(self) -> fmt::format::FmtSpan {
        let mut span = fmt::format::FmtSpan::NONE;
        if self.new {
            span |= fmt::format::FmtSpan::NEW;
        }
        if self.close {
            span |= fmt::format::FmtSpan::CLOSE;
        }
        span
    }
}

impl From<&SpanEventConfig> for SpanEvents {
    fn from(config: &SpanEventConfig) -> Self {
        Self {
            new: config.new,
            close: config.close,
        }
    }
}

/// Initializes logging from a [`LoggingConfig`].
///
/// Does nothing if a global subscriber is already installed.
pub fn init_from_config(config: &LoggingConfig) {
    let _ = LoggingBuilder::from_config(config).try_init();
}

/// A builder for configuring logging.
#[derive(Debug, Default)]
pub struct LoggingBuilder {
    directives: Vec<String>,
    level: Option<tracing::Level>,
    span_events: SpanEvents,
    format: LogFormat,
    output: LogOutput,
    with_target: bool,
    with_thread_ids: bool,
    file_path: Option<PathBuf>,
    rotation: LogRotation,
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self {
            with_target: true,
            ..Default::default()
        }
    }

    /// Creates a builder from a [`LoggingConfig`].
    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut builder = Self::new();

        builder.level = Some(config.level.to_tracing_level());
        builder.format = config.format;
        builder.output = config.output;
        builder.span_events = SpanEvents::from(&config.span_events);
        builder.with_thread_ids = config.thread_ids;
        builder.file_path.clone_from(&config.file_path);
        builder.rotation = config.rotation;

        // Sorted so the resulting filter does not depend on map order.
        let mut filters: Vec<_> = config.filters.iter().collect();
        filters.sort_by(|a, b| a.0.cmp(b.0));
        for (target, level) in filters {
            builder
                .directives
                .push(format!("{}={}", target, level.as_str()));
        }

        builder
    }

    /// Sets the global log level.
    pub fn with_level(mut self, level: tracing::Level) -> Self {
        self.level = Some(level);
        self
    }

    /// Adds a filter directive such as `ntbridge_group=trace`.
    pub fn directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    pub fn span_events(mut self, events: SpanEvents) -> Self {
        self.span_events = events;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.with_thread_ids = enabled;
        self
    }

    /// Sets the file written when output is [`LogOutput::File`].
    pub fn file_path(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    pub fn rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// `RUST_LOG` if set, else the configured level, plus the directives.
    fn build_filter(&self) -> EnvFilter {
        let base_level = self.level.unwrap_or(tracing::Level::INFO);
        let base_filter = base_level.to_string().to_lowercase();

        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&base_filter));

        for directive in &self.directives {
            match directive.parse() {
                Ok(d) => filter = filter.add_directive(d),
                Err(e) => eprintln!("Ignoring invalid log directive '{directive}': {e}"),
            }
        }

        filter
    }

    /// Initializes logging, ignoring an already-installed subscriber.
    pub fn init(self) {
        let _ = self.try_init();
    }

    /// Initializes logging, returning an error if a subscriber is installed.
    pub fn try_init(self) -> Result<(), TryInitError> {
        let filter = self.build_filter();
        let span_events = self.span_events.to_fmt_span();

        macro_rules! configure_layer {
            ($layer:expr) => {
                $layer
                    .with_span_events(span_events.clone())
                    .with_target(self.with_target)
                    .with_thread_ids(self.with_thread_ids)
            };
        }

        macro_rules! init_with_writer {
            ($writer:expr) => {
                match &self.format {
                    #[cfg(feature = "json-log")]
                    LogFormat::Json => {
                        let layer = fmt::layer()
                            .json()
                            .with_span_events(span_events.clone())
                            .with_writer($writer);
                        tracing_subscriber::registry()
                            .with(layer)
                            .with(filter)
                            .try_init()
                    }
                    LogFormat::Compact => {
                        let layer = configure_layer!(fmt::layer().compact().with_writer($writer));
                        tracing_subscriber::registry()
                            .with(layer)
                            .with(filter)
                            .try_init()
                    }
                    LogFormat::Full => {
                        let layer = configure_layer!(fmt::layer().with_writer($writer));
                        tracing_subscriber::registry()
                            .with(layer)
                            .with(filter)
                            .try_init()
                    }
                    LogFormat::Pretty => {
                        let layer = configure_layer!(fmt::layer().pretty().with_writer($writer));
                        tracing_subscriber::registry()
                            .with(layer)
                            .with(filter)
                            .try_init()
                    }
                }
            };
        }

        match &self.output {
            LogOutput::Stdout => init_with_writer!(std::io::stdout),
            LogOutput::Stderr => init_with_writer!(std::io::stderr),
            LogOutput::File => {
                let Some(path) = &self.file_path else {
                    warn!("File output requested but no file path configured, using stdout");
                    return init_with_writer!(std::io::stdout);
                };
                let dir = path.parent().unwrap_or_else(|| Path::new("."));
                let name = path
                    .file_name()
                    .unwrap_or_else(|| OsStr::new("ntbridge.log"));
                match self.rotation {
                    LogRotation::Never => init_with_writer!(rolling::never(dir, name)),
                    LogRotation::Hourly => init_with_writer!(rolling::hourly(dir, name)),
                    LogRotation::Daily => init_with_writer!(rolling::daily(dir, name)),
                }
            }
        }
    }
}
