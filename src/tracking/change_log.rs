use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::reconcile::{ChangeCounts, ChangeEntry, ChangeKind};
use super::{FileRecord, RootId};

/// File inside the log folder that receives one line per (scan, root).
pub const HISTORY_FILE_NAME: &str = "history.jsonl";

/// Errors raised while appending to or reading the change history.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Could not create log folder {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not open change history {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not write change history {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not read change history {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Change history serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One change as it appears in the history file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedChange {
    pub change: ChangeKind,
    pub path: String,
    pub before: Option<FileRecord>,
    pub after: Option<FileRecord>,
}

impl From<&ChangeEntry> for LoggedChange {
    fn from(entry: &ChangeEntry) -> Self {
        Self {
            change: entry.kind(),
            path: entry.path.clone(),
            before: entry.before().cloned(),
            after: entry.after().cloned(),
        }
    }
}

/// One durable history line: the change batch of a single root in a single scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(with = "time::serde::rfc3339")]
    pub scan_started_at: OffsetDateTime,
    pub root_id: RootId,
    pub counts: ChangeCounts,
    pub changes: Vec<LoggedChange>,
    /// Earlier failed writes, reported on the next record that made it to disk.
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Append-only writer for the change history.
#[derive(Debug)]
pub struct ChangeLogger {
    path: PathBuf,
    pending_warnings: Vec<String>,
}

impl ChangeLogger {
    /// Prepare a logger writing to `HISTORY_FILE_NAME` inside `log_folder`.
    pub fn new(log_folder: &Path) -> Result<Self, LogError> {
        fs::create_dir_all(log_folder).map_err(|source| LogError::CreateDir {
            path: log_folder.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: log_folder.join(HISTORY_FILE_NAME),
            pending_warnings: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Warnings not yet attached to a written record.
    pub fn pending_warnings(&self) -> &[String] {
        &self.pending_warnings
    }

    /// Append one record for `root_id`, even when `changes` is empty.
    ///
    /// A failed write is remembered and attached to the next successful record.
    pub fn log(
        &mut self,
        root_id: &RootId,
        changes: &[ChangeEntry],
        scan_started_at: OffsetDateTime,
    ) -> Result<(), LogError> {
        let record = LogRecord {
            scan_started_at,
            root_id: root_id.clone(),
            counts: ChangeCounts::from_changes(changes),
            changes: changes.iter().map(LoggedChange::from).collect(),
            warnings: self.pending_warnings.clone(),
        };
        match self.append(&record) {
            Ok(()) => {
                debug!(
                    "Logged {} changes for root {root_id} to {}",
                    record.changes.len(),
                    self.path.display()
                );
                self.pending_warnings.clear();
                Ok(())
            }
            Err(err) => {
                warn!("Change history write failed for root {root_id}: {err}");
                self.pending_warnings.push(format!(
                    "history for root {root_id} (scan {}) was not recorded: {err}",
                    record.scan_started_at
                ));
                Err(err)
            }
        }
    }

    /// Write `record` as one line. A failed write is cut back off the file so
    /// no partial line is left for the next record to be glued onto.
    fn append(&self, record: &LogRecord) -> Result<(), LogError> {
        let open_err = |source: std::io::Error| LogError::Open {
            path: self.path.clone(),
            source,
        };
        let write_err = |source: std::io::Error| LogError::Write {
            path: self.path.clone(),
            source,
        };
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(open_err)?;
        let start = file.metadata().map_err(open_err)?.len();
        if start > 0 && !ends_with_newline(&mut file, start).map_err(write_err)? {
            // Torn tail from an interrupted writer; start on a fresh line.
            line.insert(0, '\n');
        }
        if let Err(source) = file.write_all(line.as_bytes()).and_then(|()| file.sync_data()) {
            if let Err(trim) = file.set_len(start) {
                warn!(
                    "Could not remove partial history line from {}: {trim}",
                    self.path.display()
                );
            }
            return Err(write_err(source));
        }
        Ok(())
    }
}

fn ends_with_newline(file: &mut File, len: u64) -> std::io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Parse every record of a history file, oldest first.
///
/// Lines that do not parse, such as a record torn by a crash mid-write, are
/// skipped with a warning so they cannot hide the rest of the history.
pub fn read_records(path: &Path) -> Result<Vec<LogRecord>, LogError> {
    let file = fs::File::open(path).map_err(|source| LogError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| LogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(err) => warn!(
                "Skipping unreadable line {} of {}: {err}",
                index + 1,
                path.display()
            ),
        }
    }
    Ok(records)
}
