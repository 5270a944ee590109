//! Logging setup.
//!
//! Installs a global tracing subscriber writing to stdout and a per-launch
//! log file under the app logs directory. Old log files are pruned so the
//! directory stays bounded.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
    time::SystemTime,
};

use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

use crate::app_dirs;

const MAX_LOG_FILES: usize = 10;
const LOG_FILE_PREFIX: &str = "segue";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Errors that may occur while initializing logging.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error(transparent)]
    AppDir(#[from] app_dirs::AppDirError),
    #[error("Failed to prune log directory {path}: {source}")]
    Prune {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to format log filename time: {0}")]
    FormatTime(time::error::Format),
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(tracing::subscriber::SetGlobalDefaultError),
}

/// Initialize tracing to write to stdout and a per-launch log file.
///
/// Subsequent calls are no-ops. Failures are returned so callers can keep
/// running with stdout-only output instead of aborting.
pub fn init() -> Result<(), LoggingError> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    let log_dir = app_dirs::logs_dir()?;
    prune_old_logs(&log_dir, MAX_LOG_FILES)?;
    let file_name = log_file_name(now_local_or_utc())?;

    let (file_writer, guard) = tracing_appender::non_blocking(rolling::never(&log_dir, file_name));
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stdout))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer));
    tracing::subscriber::set_global_default(subscriber).map_err(LoggingError::SetGlobal)?;
    let _ = LOG_GUARD.set(guard);
    Ok(())
}

fn log_file_name(now: OffsetDateTime) -> Result<String, LoggingError> {
    const NAME_FORMAT: &[FormatItem<'_>] =
        format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    let stamp = now.format(NAME_FORMAT).map_err(LoggingError::FormatTime)?;
    Ok(format!("{LOG_FILE_PREFIX}_{stamp}.log"))
}

fn now_local_or_utc() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Remove the oldest `.log` files beyond `max_files`.
fn prune_old_logs(dir: &Path, max_files: usize) -> Result<(), LoggingError> {
    let map_err = |source: std::io::Error| LoggingError::Prune {
        path: dir.to_path_buf(),
        source,
    };
    let mut logs: Vec<(SystemTime, PathBuf)> = fs::read_dir(dir)
        .map_err(map_err)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("log")
        })
        .map(|path| {
            let modified = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, path)
        })
        .collect();

    logs.sort_by_key(|(modified, _)| *modified);
    let excess = logs.len().saturating_sub(max_files);
    for (_, path) in logs.into_iter().take(excess) {
        fs::remove_file(&path).map_err(map_err)?;
    }
    Ok(())
}
