use rusqlite::types::Type;

use super::schema::get_metadata;
use super::util::map_sql_error;
use super::{META_LAST_SCAN_COMPLETED_AT, StateStore, StoreError};
use crate::tracking::reconcile::Snapshot;
use crate::tracking::{FileKind, FileRecord, RootId};

/// Row counts and bookkeeping for one root present in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootSummary {
    pub root_id: RootId,
    pub file_count: usize,
    /// Epoch seconds of the last successful commit, if recorded.
    pub last_scan_completed_at: Option<i64>,
}

#[derive(Debug)]
struct UnknownKind(String);

impl std::fmt::Display for UnknownKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown file kind {:?}", self.0)
    }
}

impl std::error::Error for UnknownKind {}

impl StateStore {
    /// Last committed snapshot, keyed by path, optionally restricted to one root.
    pub fn load_all(&self, root: Option<&RootId>) -> Result<Snapshot, StoreError> {
        let mut stmt = self
            .connection
            .prepare_cached(
                "SELECT root_id, path, size, modified_ns, kind FROM files
                 WHERE ?1 IS NULL OR root_id = ?1
                 ORDER BY root_id ASC, path ASC",
            )
            .map_err(map_sql_error)?;
        let rows = stmt
            .query_map([root.map(RootId::as_str)], |row| {
                let kind: String = row.get(4)?;
                let kind = FileKind::from_column(&kind).ok_or_else(|| {
                    rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(UnknownKind(kind)))
                })?;
                Ok(FileRecord {
                    root_id: RootId::from_string(row.get::<_, String>(0)?),
                    path: row.get(1)?,
                    size: row.get::<_, i64>(2)? as u64,
                    modified_ns: row.get(3)?,
                    kind,
                })
            })
            .map_err(map_sql_error)?;
        let mut snapshot = Snapshot::new();
        for row in rows {
            let record = row.map_err(map_sql_error)?;
            snapshot.insert(record.path.clone(), record);
        }
        Ok(snapshot)
    }

    /// Every committed root with counts and last-commit times, including
    /// roots whose last commit left them empty.
    pub fn list_roots(&self) -> Result<Vec<RootSummary>, StoreError> {
        let mut stmt = self
            .connection
            .prepare(
                "SELECT root_id, COUNT(path) FROM (
                     SELECT root_id, path FROM files
                     UNION ALL
                     SELECT substr(key, length(?1) + 2), NULL FROM metadata
                     WHERE substr(key, 1, length(?1) + 1) = ?1 || ':'
                 )
                 GROUP BY root_id
                 ORDER BY root_id ASC",
            )
            .map_err(map_sql_error)?;
        let counts = stmt
            .query_map([META_LAST_SCAN_COMPLETED_AT], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(map_sql_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sql_error)?;
        counts
            .into_iter()
            .map(|(root_id, count)| {
                let root_id = RootId::from_string(root_id);
                Ok(RootSummary {
                    last_scan_completed_at: self.last_scan_completed_at(&root_id)?,
                    root_id,
                    file_count: count as usize,
                })
            })
            .collect()
    }

    /// Epoch seconds of the last successful commit for `root`.
    pub fn last_scan_completed_at(&self, root: &RootId) -> Result<Option<i64>, StoreError> {
        let value = get_metadata(&self.connection, &last_scan_key(root))?;
        Ok(value.and_then(|value| value.parse().ok()))
    }
}

pub(super) fn last_scan_key(root: &RootId) -> String {
    format!("{META_LAST_SCAN_COMPLETED_AT}:{root}")
}
