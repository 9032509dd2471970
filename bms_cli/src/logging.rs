//! Tracing setup: console layer plus an optional JSON-lines log file.

use std::path::Path;

use bms_core::error::BmsError;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

use crate::cli::FILE_GUARD;

/// Install the global subscriber. `RUST_LOG` wins over `level`, which wins
/// over `[logging].level`.
pub fn init(
    json: bool,
    level: Option<&str>,
    logging: Option<&bms_config::Logging>,
) -> eyre::Result<()> {
    let level = level
        .or_else(|| logging.and_then(|l| l.level.as_deref()))
        .unwrap_or("info");
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(level).map_err(|e| {
            eyre::Report::new(BmsError::Config(format!("invalid log level {level:?}: {e}")))
        })?,
    };

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if json {
        layers.push(fmt::layer().json().with_writer(std::io::stderr).boxed());
    } else {
        layers.push(fmt::layer().with_writer(std::io::stderr).boxed());
    }

    if let Some(path) = logging.and_then(|l| l.file.as_deref()) {
        let rotation = logging
            .and_then(|l| l.rotation.as_deref())
            .unwrap_or("never");
        let appender = file_appender(Path::new(path), rotation)?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;
    Ok(())
}

fn file_appender(path: &Path, rotation: &str) -> eyre::Result<RollingFileAppender> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = path
        .file_name()
        .map_or_else(|| "bms.log".to_owned(), |n| n.to_string_lossy().into_owned());
    let rotation = match rotation {
        "daily" => Rotation::DAILY,
        "hourly" => Rotation::HOURLY,
        _ => Rotation::NEVER,
    };
    RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(prefix)
        .build(dir)
        .map_err(|e| eyre::Report::new(BmsError::Io(format!("open log file {}: {e}", path.display()))))
}
