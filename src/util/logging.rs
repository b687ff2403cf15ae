//! Tracing subscriber setup
//!
//! Everything is written to stderr; stdout is reserved for the rendered plan
//! or manifest. `RUST_LOG` wins over the configured level when it parses.
//!
//! ```no_run
//! use imageplan::util::logging;
//! use tracing::info;
//!
//! logging::init_from_env();
//! info!(step = 3, "Running delegated command");
//! ```

use crate::config::ImageplanConfig;
use std::env;
use std::sync::Once;
use tracing::{warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: Level,
    /// One JSON object per event instead of the human format
    pub json: bool,
    /// Source file and line on every event
    pub show_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json: false,
            show_location: false,
        }
    }
}

impl LoggingConfig {
    pub fn from_config(config: &ImageplanConfig) -> Self {
        Self {
            level: parse_level(&config.log_level).unwrap_or(Level::INFO),
            json: config.log_json,
            ..Default::default()
        }
    }

    /// Apply command line verbosity; an explicit level beats `-v`, which beats `-q`
    pub fn with_cli_overrides(mut self, log_level: Option<&str>, verbose: bool, quiet: bool) -> Self {
        if let Some(level) = log_level.and_then(parse_level) {
            self.level = level;
        } else if verbose {
            self.level = Level::DEBUG;
        } else if quiet {
            self.level = Level::ERROR;
        }
        self.show_location = self.level == Level::TRACE;
        self
    }
}

/// Case-insensitive level name (`trace` .. `error`)
pub fn parse_level(name: &str) -> Option<Level> {
    name.trim().parse::<Level>().ok()
}

fn env_filter(level: Level) -> (EnvFilter, Option<String>) {
    let fallback = || EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), level));
    match env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => match EnvFilter::try_new(&directives) {
            Ok(filter) => (filter, None),
            Err(e) => (fallback(), Some(format!("ignoring RUST_LOG={}: {}", directives, e))),
        },
        _ => (fallback(), None),
    }
}

/// Install the global subscriber; calls after the first are no-ops
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let (filter, rejected) = env_filter(config.level);

        let json_layer = config.json.then(|| {
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_file(config.show_location)
                .with_line_number(config.show_location)
        });
        let text_layer = (!config.json).then(|| {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_file(config.show_location)
                .with_line_number(config.show_location)
        });

        tracing_subscriber::registry()
            .with(filter)
            .with(json_layer)
            .with(text_layer)
            .init();

        if let Some(message) = rejected {
            warn!("{}", message);
        }
    });
}

/// Initialize from `IMAGEPLAN_LOG_LEVEL` and `IMAGEPLAN_LOG_JSON`
pub fn init_from_env() {
    init_logging(LoggingConfig::from_config(&ImageplanConfig::default()));
}
