//! Scan-and-reconcile engine for tracked filesystem roots.
//!
//! A scan walks every registered root, captures per-entry metadata, diffs it
//! against the state store, commits the new snapshot per root and appends the
//! resulting change batch to the history log.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod capture;
pub mod change_log;
pub mod reconcile;
pub mod record;
pub mod scanner;
pub mod store;
pub mod walker;

pub use capture::{AccessError, CaptureOptions, MtimeResolution, capture};
pub use change_log::{ChangeLogger, HISTORY_FILE_NAME, LogError, LogRecord, LoggedChange, read_records};
pub use reconcile::{Change, ChangeCounts, ChangeEntry, ChangeKind, Snapshot, carry_forward, diff};
pub use record::{FileKind, FileRecord};
pub use scanner::{
    RootFailure, RootReport, ScanError, ScanOptions, ScanPhase, ScanResult, ScanSession,
    ScanStatus, run_scan, scan_configured,
};
pub use store::{CommitSummary, RootSummary, ScanLock, StateStore, StoreError};
pub use walker::{RootWalk, Walk, WalkError, Walker};

/// Stable identifier for a registered root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RootId(String);

impl RootId {
    /// Create a new random root identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Rehydrate a root identifier from a stored string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RootId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RootId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Directory the tracker is configured to scan, consumed as an immutable value per scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredRoot {
    pub id: RootId,
    pub path: PathBuf,
    /// Device id the root must live on; entries on other devices are skipped.
    pub device: Option<u64>,
}

impl RegisteredRoot {
    /// Register a root without device pinning.
    pub fn new(id: RootId, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            path: path.into(),
            device: None,
        }
    }

    /// Pin the root to a device id.
    pub fn with_device(mut self, device: Option<u64>) -> Self {
        self.device = device;
        self
    }

    /// Directory to walk.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
