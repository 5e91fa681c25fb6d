use clap::{Args, ValueEnum};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, thiserror::Error)]
#[error("failed to initialise logging: {0}")]
pub struct LoggingError(String);

#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct Logger {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Log level filter, e.g. `info` or `cf=debug,aws_config=warn`
    #[arg(long, global = true, env = "CF_LOG", default_value = "info")]
    pub log_level: String,
}

impl Default for Logger {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Text,
            log_level: "info".to_string(),
        }
    }
}

impl Logger {
    pub fn init(&self) -> Result<(), LoggingError> {
        init(self.log_format, &self.log_level)
    }
}

pub fn init(format: LogFormat, level: &str) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    }
    .map_err(|e| LoggingError(e.to_string()))
}
