//! Tracing initialization driven by `LoggingConfig`.

use anyhow::Result;
use std::io;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::domain::models::{LogFormat, LoggingConfig};

/// Initialize the global subscriber.
///
/// Returns a guard that must stay alive for the optional file writer to
/// flush; drop it at process exit.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let default_level = parse_log_level(&config.level)?;
    let env_filter = || {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy()
    };

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    layers.push(match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stdout)
            .with_target(true)
            .with_filter(env_filter())
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_writer(io::stdout)
            .with_target(true)
            .with_filter(env_filter())
            .boxed(),
    });

    let guard = if let Some(ref log_dir) = config.log_dir {
        let file_appender = rolling::daily(log_dir, "halo.log");
        let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

        // File output is always JSON for structured post-processing.
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .with_target(true)
                .with_filter(env_filter())
                .boxed(),
        );
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry().with(layers).init();
    Ok(guard)
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => anyhow::bail!("invalid log level: {}", other),
    }
}
