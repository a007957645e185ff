use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
};

use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

/// Read-only queries over committed state.
pub mod read;
/// Schema creation and compatibility checks.
pub mod schema;
/// Atomic per-root commits.
pub mod write;

mod lock;
mod util;

pub use lock::ScanLock;
pub use read::RootSummary;
pub use write::CommitSummary;

/// Metadata key prefix for the last completed commit per root.
pub const META_LAST_SCAN_COMPLETED_AT: &str = "last_scan_completed_at";
/// Metadata key holding the schema version.
pub const META_SCHEMA_VERSION: &str = "schema_version";

const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

/// Errors returned by the state store. Fatal to the root being committed.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite query failed.
    #[error("Database query failed: {0}")]
    Sql(#[from] rusqlite::Error),
    /// Database is locked or busy.
    #[error("Database is busy, please retry")]
    Busy,
    /// The file exists but is not a healthy SQLite database.
    #[error("Database at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    /// The database was written by an incompatible schema.
    #[error("Schema mismatch: found {found}, expected {expected}")]
    SchemaMismatch { found: String, expected: String },
    /// Failed to create the database directory.
    #[error("Could not create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to inspect the database file before opening it.
    #[error("Could not read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Another scan holds the store lock.
    #[error("Another scan is already running against {path}")]
    Locked { path: PathBuf },
    /// A write was attempted on a read-only handle.
    #[error("State store was opened read-only")]
    ReadOnly,
    /// A record handed to commit does not belong where it was filed.
    #[error("Invalid record {path}: {reason}")]
    InvalidRecord { path: String, reason: String },
    /// SQLite returned an unexpected result.
    #[error("SQLite returned an unexpected result")]
    Unexpected,
}

/// SQLite-backed record of the last committed snapshot of every root.
pub struct StateStore {
    connection: Connection,
    path: PathBuf,
    read_only: bool,
}

impl StateStore {
    /// Open (or create) the store at `path`, applying the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        check_header(path)?;
        util::create_parent_if_needed(path)?;
        let connection = Connection::open(path).map_err(|err| util::map_open_error(path, err))?;
        let store = Self {
            connection,
            path: path.to_path_buf(),
            read_only: false,
        };
        store.apply_pragmas()?;
        store.quick_check()?;
        schema::apply_schema(&store.connection)?;
        Ok(store)
    }

    /// Open an existing store for inspection; writes are refused.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        check_header(path)?;
        let connection = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|err| util::map_open_error(path, err))?;
        let store = Self {
            connection,
            path: path.to_path_buf(),
            read_only: true,
        };
        store
            .connection
            .execute_batch("PRAGMA busy_timeout=5000;")
            .map_err(util::map_sql_error)?;
        store.quick_check()?;
        schema::verify_schema(&store.connection)?;
        Ok(store)
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Files that belong to the store and must never be tracked as user data.
    pub fn companion_paths(path: &Path) -> Vec<PathBuf> {
        let mut paths = vec![path.to_path_buf(), lock::lock_path(path)];
        for suffix in ["-wal", "-shm", "-journal"] {
            let mut name = path.as_os_str().to_os_string();
            name.push(suffix);
            paths.push(PathBuf::from(name));
        }
        paths
    }

    fn apply_pragmas(&self) -> Result<(), StoreError> {
        self.connection
            .execute_batch(
                "PRAGMA journal_mode=WAL;
             PRAGMA synchronous = FULL;
             PRAGMA busy_timeout=5000;
             PRAGMA temp_store=MEMORY;",
            )
            .map_err(util::map_sql_error)
    }

    fn quick_check(&self) -> Result<(), StoreError> {
        let verdict: String = self
            .connection
            .query_row("PRAGMA quick_check", [], |row| row.get(0))
            .map_err(|err| util::map_open_error(&self.path, err))?;
        if verdict == "ok" {
            Ok(())
        } else {
            Err(StoreError::Corrupt {
                path: self.path.clone(),
                reason: verdict,
            })
        }
    }
}

/// Reject non-empty files that are not SQLite databases before SQLite touches them.
fn check_header(path: &Path) -> Result<(), StoreError> {
    let mut file = match fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let mut header = Vec::with_capacity(SQLITE_HEADER.len());
    file.by_ref()
        .take(SQLITE_HEADER.len() as u64)
        .read_to_end(&mut header)
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    if header.is_empty() || header.as_slice() == SQLITE_HEADER {
        Ok(())
    } else {
        Err(StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: "missing SQLite header".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_database_and_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/state.db");
        let store = StateStore::open(&path).unwrap();
        assert!(path.is_file());
        assert!(!store.is_read_only());
    }

    #[test]
    fn reopen_keeps_existing_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");
        drop(StateStore::open(&path).unwrap());
        assert!(StateStore::open(&path).is_ok());
    }

    #[test]
    fn garbage_file_is_reported_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");
        std::fs::write(&path, b"definitely not a database, just text").unwrap();

        let err = StateStore::open(&path).err().unwrap();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn read_only_open_requires_existing_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.db");
        assert!(StateStore::open_read_only(&path).is_err());
    }

    #[test]
    fn companion_paths_cover_sqlite_side_files() {
        let paths = StateStore::companion_paths(Path::new("/data/state.db"));
        assert!(paths.contains(&PathBuf::from("/data/state.db")));
        assert!(paths.contains(&PathBuf::from("/data/state.db-wal")));
        assert!(paths.contains(&PathBuf::from("/data/state.db-shm")));
        assert!(paths.contains(&PathBuf::from("/data/state.db.lock")));
    }
}
