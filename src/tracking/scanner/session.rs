use std::path::{Path, PathBuf};

use tracing::info;

use super::{ScanError, ScanOptions, ScanResult, run_scan};
use crate::config::TrackerConfig;
use crate::tracking::RegisteredRoot;
use crate::tracking::change_log::ChangeLogger;
use crate::tracking::store::{ScanLock, StateStore};

/// Resources held for the duration of one configured scan.
///
/// Dropping the session closes the store and then releases the scan lock,
/// on every exit path.
pub struct ScanSession {
    store: StateStore,
    logger: ChangeLogger,
    exclusions: Vec<PathBuf>,
    _lock: ScanLock,
}

impl ScanSession {
    /// Lock the store at `database`, open it and prepare the history in `log_folder`.
    pub fn open(database: &Path, log_folder: &Path) -> Result<Self, ScanError> {
        let lock = ScanLock::acquire(database)?;
        let store = StateStore::open(database)?;
        let logger = ChangeLogger::new(log_folder)?;
        let mut exclusions = StateStore::companion_paths(database);
        exclusions.push(log_folder.to_path_buf());
        Ok(Self {
            store,
            logger,
            exclusions,
            _lock: lock,
        })
    }

    /// Scan `roots`, never walking the store's or logger's own files.
    pub fn run(&mut self, roots: &[RegisteredRoot], options: &ScanOptions<'_>) -> ScanResult {
        let mut options = options.clone();
        options.exclusions.extend(self.exclusions.iter().cloned());
        run_scan(&mut self.store, &mut self.logger, roots, &options)
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn logger(&self) -> &ChangeLogger {
        &self.logger
    }
}

/// Run one scan as configured: all roots, or only those named in `only`.
pub fn scan_configured(
    config: &TrackerConfig,
    only: &[String],
    options: &ScanOptions<'_>,
) -> Result<ScanResult, ScanError> {
    let roots = config.select_roots(only)?;
    let mut options = options.clone();
    options.capture.mtime_resolution = config.mtime_resolution;
    let mut session = ScanSession::open(&config.database, &config.log_folder)?;
    info!(
        "Scanning {} roots into {}",
        roots.len(),
        session.store().path().display()
    );
    Ok(session.run(&roots, &options))
}
