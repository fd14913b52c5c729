//! Logging configuration and initialization

use std::env;

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Logging output format
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

/// Logging output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Human,
            output: LogOutput::Stdout,
        }
    }
}

impl LoggingConfig {
    /// Read `MENTAL_POKER_LOG_LEVEL`, `MENTAL_POKER_LOG_FORMAT` and `MENTAL_POKER_LOG_OUTPUT`
    pub fn from_env() -> Self {
        let level = env::var("MENTAL_POKER_LOG_LEVEL")
            .unwrap_or_else(|_| "info".to_string())
            .parse::<Level>()
            .unwrap_or(Level::INFO);

        let format = match env::var("MENTAL_POKER_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Human,
        };

        let output = match env::var("MENTAL_POKER_LOG_OUTPUT").as_deref() {
            Ok("stderr") => LogOutput::Stderr,
            _ => LogOutput::Stdout,
        };

        Self { level, format, output }
    }
}

/// Initialize structured logging with the given configuration
pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env_lossy()
        .add_directive("tokio=info".parse()?);

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        LogFormat::Human => {
            let fmt_layer = fmt::layer().with_target(true).with_line_number(true);

            match config.output {
                LogOutput::Stdout => registry.with(fmt_layer.with_writer(std::io::stdout)).try_init()?,
                LogOutput::Stderr => registry.with(fmt_layer.with_writer(std::io::stderr)).try_init()?,
            }
        }
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);

            match config.output {
                LogOutput::Stdout => registry.with(fmt_layer.with_writer(std::io::stdout)).try_init()?,
                LogOutput::Stderr => registry.with(fmt_layer.with_writer(std::io::stderr)).try_init()?,
            }
        }
    }

    Ok(())
}

/// Initialize logging with environment-based configuration
pub fn init_from_env() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging(LoggingConfig::from_env())
}
