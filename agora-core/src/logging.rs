use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;

type BoxedLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

/// Output format for the fmt layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn from_config(format: &str) -> anyhow::Result<Self> {
        match format {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(anyhow::anyhow!("Invalid log format: {other}")),
        }
    }
}

/// Initialize structured logging based on configuration
///
/// `RUST_LOG` wins over the configured level when set. Output goes to
/// stderr unless `file_path` is configured.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let format = LogFormat::from_config(&config.format)?;
    let env_filter = build_filter(&config.level)?;

    let file = match &config.file_path {
        Some(path) => Some(Arc::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?,
        )),
        None => None,
    };

    let layer: BoxedLayer = match format {
        LogFormat::Json => {
            // JSON format for production (structured logging)
            let json = fmt::layer()
                .json()
                .with_span_events(FmtSpan::CLOSE)
                .with_current_span(true)
                .with_span_list(true)
                .with_target(true)
                .with_line_number(true)
                .with_file(true);
            match file {
                Some(file) => json.with_writer(file).boxed(),
                None => json.with_writer(std::io::stderr).boxed(),
            }
        }
        LogFormat::Pretty => {
            let pretty = fmt::layer()
                .pretty()
                .with_span_events(FmtSpan::CLOSE)
                .with_target(true)
                .with_line_number(true)
                .with_file(false);
            match file {
                Some(file) => pretty.with_writer(file).boxed(),
                None => pretty.with_writer(std::io::stderr).boxed(),
            }
        }
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()?;

    Ok(())
}

fn build_filter(level: &str) -> anyhow::Result<EnvFilter> {
    let log_level = parse_log_level(level)?;
    Ok(EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string())))
}

/// Parse log level string to tracing Level
fn parse_log_level(level: &str) -> anyhow::Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(anyhow::anyhow!("Invalid log level: {level}")),
    }
}
