//! Tracing setup for `filetrack` runs.
//!
//! Every invocation gets its own plain-text run log named after its start time,
//! written next to the change history. Console output goes to stderr so the
//! scan report on stdout stays clean.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::OnceLock,
};

use time::{
    OffsetDateTime, UtcOffset,
    format_description::{BorrowedFormatItem, FormatItem},
    macros::format_description,
};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

use crate::app_dirs;

/// Run logs kept per folder; older ones are deleted at startup.
const MAX_RUN_LOGS: usize = 30;
const RUN_LOG_PREFIX: &str = "filetrack_";
const RUN_LOG_EXTENSION: &str = "log";

static RUN_LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("No config directory available for run logs")]
    NoConfigDir,
    #[error("Failed to prepare run log at {path}: {source}")]
    Prepare {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to prune run logs in {path}: {source}")]
    Prune {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to format run log name: {0}")]
    FormatTime(#[from] time::error::Format),
    #[error("A global tracing subscriber is already installed: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Install the global subscriber and open this run's log file.
///
/// `log_dir` is the tracker's log folder; without one (no config yet) the
/// run log goes to the application's own logs directory. Returns the path of
/// the run log. Calling it again is a no-op that returns `None`.
pub fn init(log_dir: Option<&Path>) -> Result<Option<PathBuf>, LoggingError> {
    if RUN_LOG_GUARD.get().is_some() {
        return Ok(None);
    }
    let dir = match log_dir {
        Some(dir) => dir.to_path_buf(),
        None => app_dirs::fallback_logs_dir().map_err(|err| match err {
            app_dirs::AppDirError::NoHome => LoggingError::NoConfigDir,
            app_dirs::AppDirError::CreateDir { path, source } => {
                LoggingError::Prepare { path, source }
            }
        })?,
    };
    let name = run_log_name(OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()))?;
    let path = create_run_log(&dir, &name)?;
    prune_run_logs(&dir, &name, MAX_RUN_LOGS)?;

    let (file_writer, guard) = tracing_appender::non_blocking(rolling::never(&dir, &name));
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    const STAMP: &[FormatItem<'static>] =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");
    let timer: fmt::time::OffsetTime<BorrowedFormatItem<'static>> =
        fmt::time::OffsetTime::new(offset, STAMP.into());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = Registry::default()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_timer(timer.clone())
                .with_writer(std::io::stderr),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_timer(timer)
                .with_writer(file_writer),
        );
    tracing::subscriber::set_global_default(subscriber)?;
    let _ = RUN_LOG_GUARD.set(guard);
    tracing::debug!("Run log at {}", path.display());
    Ok(Some(path))
}

fn run_log_name(started: OffsetDateTime) -> Result<String, LoggingError> {
    const NAME: &[FormatItem<'static>] =
        format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    Ok(format!(
        "{RUN_LOG_PREFIX}{}.{RUN_LOG_EXTENSION}",
        started.format(NAME)?
    ))
}

fn create_run_log(dir: &Path, name: &str) -> Result<PathBuf, LoggingError> {
    let path = dir.join(name);
    fs::create_dir_all(dir)
        .and_then(|()| OpenOptions::new().create(true).append(true).open(&path))
        .map_err(|source| LoggingError::Prepare {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

fn is_run_log(name: &str) -> bool {
    name.starts_with(RUN_LOG_PREFIX)
        && Path::new(name).extension().and_then(|ext| ext.to_str()) == Some(RUN_LOG_EXTENSION)
}

/// Delete the oldest run logs beyond `keep`, never the current one.
///
/// Names embed the start time, so name order is age order.
fn prune_run_logs(dir: &Path, current: &str, keep: usize) -> Result<(), LoggingError> {
    let prune_err = |source: std::io::Error| LoggingError::Prune {
        path: dir.to_path_buf(),
        source,
    };
    let mut names: Vec<String> = fs::read_dir(dir)
        .map_err(prune_err)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_file()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| is_run_log(name))
        .collect();
    names.sort_unstable();
    let excess = names.len().saturating_sub(keep);
    for name in names.iter().take(excess).filter(|name| *name != current) {
        fs::remove_file(dir.join(name)).map_err(prune_err)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn run_log_name_embeds_start_time() {
        let started = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        assert_eq!(
            run_log_name(started).unwrap(),
            "filetrack_2023-11-14_22-13-20.log"
        );
    }

    #[test]
    fn pruning_keeps_newest_run_logs_and_history() {
        let dir = tempdir().unwrap();
        for day in 10..22 {
            create_run_log(dir.path(), &format!("filetrack_2024-01-{day}_00-00-00.log")).unwrap();
        }
        fs::write(dir.path().join("history.jsonl"), b"{}\n").unwrap();
        fs::write(dir.path().join("other-tool.log"), b"keep me").unwrap();

        prune_run_logs(dir.path(), "filetrack_2024-01-21_00-00-00.log", 10).unwrap();

        let mut left: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.unwrap().file_name().into_string().ok())
            .filter(|name| is_run_log(name))
            .collect();
        left.sort();
        assert_eq!(left.len(), 10);
        assert_eq!(left[0], "filetrack_2024-01-12_00-00-00.log");
        assert!(dir.path().join("history.jsonl").exists());
        assert!(dir.path().join("other-tool.log").exists());
    }

    #[test]
    fn create_run_log_makes_missing_folder() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("logs/today");
        let path = create_run_log(&nested, "filetrack_x.log").unwrap();
        assert!(path.is_file());
    }
}
