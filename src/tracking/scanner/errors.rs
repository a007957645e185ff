use thiserror::Error;

use crate::config::ConfigError;
use crate::tracking::change_log::LogError;
use crate::tracking::store::StoreError;
use crate::tracking::walker::WalkError;

/// Why a single root did not get its new state committed.
#[derive(Debug, Error)]
pub enum RootFailure {
    /// The root could not be walked at all.
    #[error(transparent)]
    Walk(#[from] WalkError),
    /// Reading prior state or committing the new one failed; nothing was changed.
    #[error("State store error: {0}")]
    Storage(#[from] StoreError),
    /// Scan was canceled by the caller.
    #[error("Scan canceled")]
    Canceled,
    /// The caller's deadline passed before this root was processed.
    #[error("Deadline passed before this root was processed")]
    DeadlineExceeded,
}

/// Errors that stop a configured scan before any root is processed.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Could not open state store: {0}")]
    Store(#[from] StoreError),
    #[error("Could not prepare change history: {0}")]
    Log(#[from] LogError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
