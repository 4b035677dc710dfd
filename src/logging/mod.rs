//! ## Sets up logging by reading configuration from environment variables.
//!
//! Environment variables used:
//! - LOG_MODE: "stdout" (default) or "file"
//! - LOG_LEVEL: log level ("trace", "debug", "info", "warn", "error"); default is "info".
//!   A full `RUST_LOG` style directive such as `safe_relay_service=debug,info` is accepted too.
//! - LOG_FORMAT: "compact" (default), "pretty" or "json"
//! - LOG_FILE_PATH: when using file mode, the path of the log file (default "logs/safe-relay.log")

use std::{
    env,
    fs::{create_dir_all, File},
    path::Path,
    sync::Mutex,
};

use chrono::{NaiveDate, Utc};
use eyre::{eyre, Result};
use tracing::info;
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    prelude::*,
    EnvFilter, Layer, Registry,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    fn from_env() -> Self {
        match env::var("LOG_FORMAT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Appends the UTC date to the log file name, `logs/relay.log` becomes
/// `logs/relay-2024-01-31.log`.
fn rolled_file_path(base_file_path: &str, date: NaiveDate) -> String {
    let date_str = date.format("%Y-%m-%d").to_string();
    match base_file_path.strip_suffix(".log") {
        Some(trimmed) => format!("{trimmed}-{date_str}.log"),
        None => format!("{base_file_path}-{date_str}.log"),
    }
}

fn fmt_layer<W>(format: LogFormat, writer: W, ansi: bool) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi).with_target(true);
    match format {
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

pub fn setup_logging() -> Result<()> {
    let log_mode = env::var("LOG_MODE").unwrap_or_else(|_| "stdout".to_string());
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_new(log_level.to_lowercase())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let format = LogFormat::from_env();

    let layer = if log_mode.to_lowercase() == "file" {
        let base_file_path =
            env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/safe-relay.log".to_string());
        let rolled_file_path = rolled_file_path(&base_file_path, Utc::now().date_naive());

        if let Some(parent) = Path::new(&rolled_file_path).parent() {
            create_dir_all(parent)
                .map_err(|e| eyre!("Failed to create log directory {:?}: {}", parent, e))?;
        }
        let log_file = File::options()
            .create(true)
            .append(true)
            .open(&rolled_file_path)
            .map_err(|e| eyre!("Unable to create log file {}: {}", rolled_file_path, e))?;

        fmt_layer(format, Mutex::new(log_file), false)
    } else {
        fmt_layer(format, std::io::stdout, true)
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

    info!(mode = %log_mode, level = %log_level, "logging is successfully configured");
    Ok(())
}
