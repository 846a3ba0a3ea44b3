use std::io::stderr;

use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_sdk::logs::{SdkLogger, SdkLoggerProvider};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_DIR: &str = "logs";
const LOG_LEVELS: [&str; 5] = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];

/// Print to stderr and exit with a non-zero exit code
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        eprintln!($($arg)*);
        std::process::exit(1);
    }};
}

/// Writer guards that flush buffered log lines when dropped. Keep them alive for the
/// whole process.
pub struct LogGuards {
    _file: WorkerGuard,
    _stderr: WorkerGuard,
}

pub fn is_valid_level(log_level: &str) -> bool {
    LOG_LEVELS.contains(&log_level)
}

/// Initialise the global logger: stderr, a daily log file under [`LOG_DIR`] and the
/// OpenTelemetry bridge. `RUST_LOG` overrides `log_level` when set.
pub fn new(
    log_level: &str,
    otel_layer: OpenTelemetryTracingBridge<SdkLoggerProvider, SdkLogger>,
) -> LogGuards {
    if !is_valid_level(log_level) {
        fatal!(
            "Invalid log level `{log_level}`. Valid levels are: {}",
            LOG_LEVELS.join(", ")
        );
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|e| fatal!("Failed to create log filter: {e}"));

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("brokernode")
        .filename_suffix("log")
        .build(LOG_DIR)
        .unwrap_or_else(|e| fatal!("Failed to initialise rolling file appender: {e}"));

    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(appender);
    let (non_blocking_stderr, stderr_guard) = tracing_appender::non_blocking(stderr());

    let logger = Registry::default()
        .with(filter)
        .with(
            fmt::Layer::default()
                .with_writer(non_blocking_stderr)
                .with_line_number(true),
        )
        .with(
            fmt::Layer::default()
                .with_writer(non_blocking_file)
                .with_line_number(true)
                .with_ansi(false),
        )
        .with(otel_layer);

    if let Err(e) = tracing::subscriber::set_global_default(logger) {
        fatal!("Failed to initialise logger: {e}");
    }

    LogGuards {
        _file: file_guard,
        _stderr: stderr_guard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_levels_are_upper_case_names() {
        for level in LOG_LEVELS {
            assert!(is_valid_level(level));
        }
        assert!(!is_valid_level("info"));
        assert!(!is_valid_level("VERBOSE"));
    }
}
