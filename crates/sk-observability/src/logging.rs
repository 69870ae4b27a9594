//! Logging infrastructure for Scopekeeper.
//!
//! Structured logging on the tracing ecosystem, with text output for
//! operators and JSON output for log pipelines.

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Crates whose events pass the fallback filter.
const LOG_TARGETS: &[&str] = &["sk_core", "sk_policy", "sk_observability", "sk_cli"];

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level.
    pub level: Level,
    /// Whether to use JSON format.
    pub json_format: bool,
    /// Whether to include span events.
    pub include_spans: bool,
    /// Whether to include file/line info.
    pub include_location: bool,
    /// Whether to include thread IDs.
    pub include_thread_ids: bool,
    /// Whether to include target (module path).
    pub include_target: bool,
    /// Whether to write to stderr instead of stdout.
    pub to_stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            include_spans: false,
            include_location: false,
            include_thread_ids: false,
            include_target: true,
            to_stderr: true,
        }
    }
}

impl LoggingConfig {
    /// Creates a development configuration with more verbose output.
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            json_format: false,
            include_spans: true,
            include_location: true,
            include_thread_ids: true,
            include_target: true,
            to_stderr: true,
        }
    }

    /// Creates a production configuration with JSON output.
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            json_format: true,
            include_spans: false,
            include_location: false,
            include_thread_ids: false,
            include_target: true,
            to_stderr: true,
        }
    }

    /// Parses a level name such as `debug` or `WARN`.
    pub fn parse_level(level: &str) -> Option<Level> {
        level.trim().parse().ok()
    }

    /// Filter directive used when `RUST_LOG` is unset.
    pub fn fallback_directive(&self) -> String {
        LOG_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, self.level))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Initializes the logging system with default configuration.
pub fn init_logging() {
    init_logging_with_config(LoggingConfig::default());
}

/// Initializes the logging system with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level. Does nothing if a
/// global subscriber is already installed.
pub fn init_logging_with_config(config: LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.fallback_directive()));

    let _ = tracing_subscriber::registry()
        .with(fmt_layer(&config))
        .with(env_filter)
        .try_init();
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn fmt_layer(config: &LoggingConfig) -> BoxedLayer {
    let span_events = if config.include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let writer = if config.to_stderr {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };

    let layer = fmt::layer()
        .with_writer(writer)
        .with_span_events(span_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread_ids)
        .with_target(config.include_target);

    if config.json_format {
        Box::new(layer.json())
    } else {
        Box::new(layer)
    }
}

/// Creates a span for a compliance run.
#[macro_export]
macro_rules! run_span {
    ($run_id:expr) => {
        tracing::info_span!("compliance_run", run_id = %$run_id)
    };
    ($run_id:expr, $($field:tt)*) => {
        tracing::info_span!("compliance_run", run_id = %$run_id, $($field)*)
    };
}

/// Creates a span for work on a single asset.
#[macro_export]
macro_rules! asset_span {
    ($asset_id:expr) => {
        tracing::debug_span!("asset", asset_id = %$asset_id)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.json_format);
        assert!(config.to_stderr);
    }

    #[test]
    fn test_production_config() {
        let config = LoggingConfig::production();
        assert_eq!(config.level, Level::INFO);
        assert!(config.json_format);
    }

    #[test]
    fn test_development_config() {
        let config = LoggingConfig::development();
        assert_eq!(config.level, Level::DEBUG);
        assert!(!config.json_format);
    }

    #[test]
    fn test_fallback_directive() {
        let config = LoggingConfig {
            level: Level::WARN,
            ..Default::default()
        };
        assert_eq!(
            config.fallback_directive(),
            "sk_core=WARN,sk_policy=WARN,sk_observability=WARN,sk_cli=WARN"
        );
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(LoggingConfig::parse_level("debug"), Some(Level::DEBUG));
        assert_eq!(LoggingConfig::parse_level(" WARN "), Some(Level::WARN));
        assert_eq!(LoggingConfig::parse_level("chatty"), None);
    }

    #[test]
    fn test_layers_build_for_both_formats() {
        let _text = fmt_layer(&LoggingConfig::development());
        let _json = fmt_layer(&LoggingConfig {
            to_stderr: false,
            ..LoggingConfig::production()
        });
    }

    #[test]
    fn test_span_macros() {
        let run_id = uuid::Uuid::new_v4();
        let _run = crate::run_span!(run_id, assets = 3);
        let _asset = crate::asset_span!("db-01");
    }
}
