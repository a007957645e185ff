use std::collections::HashSet;

use rusqlite::{Connection, OptionalExtension};

use super::util::map_sql_error;
use super::{META_SCHEMA_VERSION, StoreError};

/// Version written by this build. Bumped on incompatible layout changes.
pub const SCHEMA_VERSION: &str = "1";

const FILES_COLUMNS: [&str; 5] = ["root_id", "path", "size", "modified_ns", "kind"];

pub(super) fn apply_schema(connection: &Connection) -> Result<(), StoreError> {
    check_version(connection)?;
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
             CREATE TABLE IF NOT EXISTS files (
                root_id TEXT NOT NULL,
                path TEXT NOT NULL,
                size INTEGER NOT NULL,
                modified_ns INTEGER NOT NULL,
                kind TEXT NOT NULL,
                PRIMARY KEY (root_id, path)
             ) WITHOUT ROWID;",
        )
        .map_err(map_sql_error)?;
    check_files_columns(connection)?;
    if get_metadata(connection, META_SCHEMA_VERSION)?.is_none() {
        set_metadata(connection, META_SCHEMA_VERSION, SCHEMA_VERSION)?;
    }
    Ok(())
}

/// Verify an existing database without creating anything.
pub(super) fn verify_schema(connection: &Connection) -> Result<(), StoreError> {
    check_version(connection)?;
    if !table_exists(connection, "files")? {
        return Err(StoreError::SchemaMismatch {
            found: "no files table".to_string(),
            expected: format!("schema version {SCHEMA_VERSION}"),
        });
    }
    check_files_columns(connection)
}

fn check_version(connection: &Connection) -> Result<(), StoreError> {
    if !table_exists(connection, "metadata")? {
        return Ok(());
    }
    match get_metadata(connection, META_SCHEMA_VERSION)? {
        Some(found) if found != SCHEMA_VERSION => Err(StoreError::SchemaMismatch {
            found: format!("schema version {found}"),
            expected: format!("schema version {SCHEMA_VERSION}"),
        }),
        _ => Ok(()),
    }
}

fn check_files_columns(connection: &Connection) -> Result<(), StoreError> {
    let columns = table_columns(connection, "files")?;
    let missing: Vec<&str> = FILES_COLUMNS
        .iter()
        .copied()
        .filter(|column| !columns.contains(*column))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(StoreError::SchemaMismatch {
            found: format!("files table without {}", missing.join(", ")),
            expected: format!("columns {}", FILES_COLUMNS.join(", ")),
        })
    }
}

pub(super) fn table_exists(connection: &Connection, table: &str) -> Result<bool, StoreError> {
    let exists: Option<String> = connection
        .query_row(
            "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
            [table],
            |row| row.get(0),
        )
        .optional()
        .map_err(map_sql_error)?;
    Ok(exists.is_some())
}

fn table_columns(connection: &Connection, table: &str) -> Result<HashSet<String>, StoreError> {
    let mut stmt = connection
        .prepare(&format!("PRAGMA table_info({table})"))
        .map_err(map_sql_error)?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(map_sql_error)?
        .collect::<Result<HashSet<_>, _>>()
        .map_err(map_sql_error)?;
    Ok(columns)
}

pub(super) fn get_metadata(connection: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    connection
        .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()
        .map_err(map_sql_error)
}

pub(super) fn set_metadata(connection: &Connection, key: &str, value: &str) -> Result<(), StoreError> {
    connection
        .execute(
            "INSERT INTO metadata (key, value)
             VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )
        .map_err(map_sql_error)?;
    Ok(())
}
