//! Logging utilities for datamodel_sync
//!
//! Sets up a global `tracing` subscriber from the `[logging]` config section.

use std::fs::File;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Initialize logging based on configuration.
///
/// Without a `[logging]` section, progress is logged as text to stdout at
/// `info`. `RUST_LOG` directives are honoured on top of the configured level.
pub fn init_logging(config: &Option<LoggingConfig>) -> Result<()> {
    let default_config = LoggingConfig {
        level: "info".to_string(),
        file: None,
        format: "text".to_string(),
        stdout: true,
    };
    let config = config.as_ref().unwrap_or(&default_config);

    let level = parse_level(&config.level);
    let directive = format!("datamodel_sync={}", level)
        .parse::<Directive>()
        .map_err(|e| Error::ConfigError(format!("Invalid log level '{}': {}", config.level, e)))?;
    let env_filter = EnvFilter::from_default_env().add_directive(directive);
    let json = config.format.eq_ignore_ascii_case("json");

    if let Some(file_path) = &config.file {
        if let Some(parent) = Path::new(file_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(file_path)?;

        if json {
            let subscriber = fmt::Subscriber::builder()
                .json()
                .with_env_filter(env_filter)
                .with_writer(file)
                .finish();
            set_global_default(subscriber)
        } else {
            let subscriber = fmt::Subscriber::builder()
                .with_ansi(false)
                .with_env_filter(env_filter)
                .with_writer(file)
                .finish();
            set_global_default(subscriber)
        }
    } else if config.stdout {
        if json {
            let subscriber = fmt::Subscriber::builder()
                .json()
                .with_env_filter(env_filter)
                .finish();
            set_global_default(subscriber)
        } else {
            let subscriber = fmt::Subscriber::builder()
                .with_target(false)
                .with_env_filter(env_filter)
                .finish();
            set_global_default(subscriber)
        }
    } else {
        Ok(())
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn set_global_default<S>(subscriber: S) -> Result<()>
where
    S: tracing::Subscriber + Send + Sync + 'static,
{
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::ConfigError(format!("Could not install log subscriber: {}", e)))
}
