//! Process-wide `tracing` subscriber.
//!
//! The interactive session writes to a file under the data directory so log
//! lines never land in the middle of a streamed response. The headless engine
//! logs to stderr.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::core::config::Settings;

pub const LOG_ENV: &str = "LOG_LEVEL";
pub const LOG_FILE_NAME: &str = "subconscious.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// Append to `<data_dir>/logs/subconscious.log`.
    File,
    Stderr,
}

pub fn default_directive(dev: bool) -> &'static str {
    if dev {
        "debug"
    } else {
        "info"
    }
}

/// Builds the filter from `LOG_LEVEL`, falling back to the mode default when
/// unset or unparsable.
pub fn build_filter(env_value: Option<&str>, dev: bool) -> EnvFilter {
    env_value
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directive(dev)))
}

pub fn log_file_path(settings: &Settings) -> PathBuf {
    settings.logs_dir().join(LOG_FILE_NAME)
}

/// Installs the global subscriber. Returns the log file path when logging to
/// a file. Calling it twice keeps the first subscriber.
pub fn init_logging(
    settings: &Settings,
    dev: bool,
    target: LogTarget,
) -> Result<Option<PathBuf>, Box<dyn std::error::Error + Send + Sync>> {
    let env_value = std::env::var(LOG_ENV).ok();
    let filter = build_filter(env_value.as_deref(), dev);

    match target {
        LogTarget::Stderr => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .try_init();
            Ok(None)
        }
        LogTarget::File => {
            let path = log_file_path(settings);
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false)
                .try_init();
            Ok(Some(path))
        }
    }
}
