use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{TransactionBehavior, params};

use super::read::last_scan_key;
use super::schema::set_metadata;
use super::util::map_sql_error;
use super::{StateStore, StoreError};
use crate::tracking::reconcile::Snapshot;
use crate::tracking::RootId;

/// Row-level effect of one commit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CommitSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl StateStore {
    /// Atomically replace the committed record set of `root` with `records`.
    ///
    /// Paths absent from `records` are deleted, the rest inserted or updated.
    /// Runs in one immediate transaction: either every row change and the
    /// last-scan bookkeeping become visible, or none do.
    pub fn commit(&mut self, root: &RootId, records: &Snapshot) -> Result<CommitSummary, StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        validate_records(root, records)?;

        let tx = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_sql_error)?;
        let existing = {
            let mut stmt = tx
                .prepare_cached("SELECT path, size, modified_ns, kind FROM files WHERE root_id = ?1")
                .map_err(map_sql_error)?;
            stmt.query_map([root.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    (
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ),
                ))
            })
            .map_err(map_sql_error)?
            .collect::<Result<HashMap<_, _>, _>>()
            .map_err(map_sql_error)?
        };

        let mut summary = CommitSummary::default();
        {
            let mut delete = tx
                .prepare_cached("DELETE FROM files WHERE root_id = ?1 AND path = ?2")
                .map_err(map_sql_error)?;
            for path in existing.keys().filter(|path| !records.contains_key(*path)) {
                delete
                    .execute(params![root.as_str(), path])
                    .map_err(map_sql_error)?;
                summary.deleted += 1;
            }

            let mut upsert = tx
                .prepare_cached(
                    "INSERT INTO files (root_id, path, size, modified_ns, kind)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(root_id, path) DO UPDATE SET size = excluded.size,
                                                              modified_ns = excluded.modified_ns,
                                                              kind = excluded.kind",
                )
                .map_err(map_sql_error)?;
            for (path, record) in records {
                let row = (record.size as i64, record.modified_ns, record.kind.as_str());
                match existing.get(path) {
                    Some((size, modified_ns, kind))
                        if (*size, *modified_ns, kind.as_str()) == row =>
                    {
                        continue;
                    }
                    Some(_) => summary.updated += 1,
                    None => summary.inserted += 1,
                }
                upsert
                    .execute(params![root.as_str(), path, row.0, row.1, row.2])
                    .map_err(map_sql_error)?;
            }
        }

        let completed_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            .to_string();
        set_metadata(&tx, &last_scan_key(root), &completed_at)?;
        tx.commit().map_err(map_sql_error)?;
        Ok(summary)
    }
}

fn validate_records(root: &RootId, records: &Snapshot) -> Result<(), StoreError> {
    for (path, record) in records {
        if record.path != *path {
            return Err(StoreError::InvalidRecord {
                path: path.clone(),
                reason: format!("keyed under a different path than {}", record.path),
            });
        }
        if record.root_id != *root {
            return Err(StoreError::InvalidRecord {
                path: path.clone(),
                reason: format!("belongs to root {}, not {root}", record.root_id),
            });
        }
        if i64::try_from(record.size).is_err() {
            return Err(StoreError::InvalidRecord {
                path: path.clone(),
                reason: format!("size {} does not fit the store", record.size),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{FileKind, FileRecord};
    use tempfile::tempdir;

    fn record(root: &str, path: &str, size: u64) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            root_id: RootId::from_string(root),
            size,
            modified_ns: 1_000,
            kind: FileKind::Regular,
        }
    }

    fn snapshot(records: &[FileRecord]) -> Snapshot {
        records
            .iter()
            .map(|record| (record.path.clone(), record.clone()))
            .collect()
    }

    fn open(dir: &std::path::Path) -> StateStore {
        StateStore::open(dir.join("state.db")).unwrap()
    }

    #[test]
    fn commit_inserts_updates_and_deletes() {
        let dir = tempdir().unwrap();
        let mut store = open(dir.path());
        let root = RootId::from_string("data");

        let first = snapshot(&[record("data", "/d/a", 1), record("data", "/d/b", 2)]);
        let summary = store.commit(&root, &first).unwrap();
        assert_eq!(
            summary,
            CommitSummary {
                inserted: 2,
                updated: 0,
                deleted: 0
            }
        );

        let second = snapshot(&[record("data", "/d/a", 10), record("data", "/d/c", 3)]);
        let summary = store.commit(&root, &second).unwrap();
        assert_eq!(
            summary,
            CommitSummary {
                inserted: 1,
                updated: 1,
                deleted: 1
            }
        );
        assert_eq!(store.load_all(Some(&root)).unwrap(), second);
    }

    #[test]
    fn unchanged_rows_are_not_rewritten() {
        let dir = tempdir().unwrap();
        let mut store = open(dir.path());
        let root = RootId::from_string("data");
        let records = snapshot(&[record("data", "/d/a", 1)]);
        store.commit(&root, &records).unwrap();

        let summary = store.commit(&root, &records).unwrap();
        assert_eq!(summary, CommitSummary::default());
    }

    #[test]
    fn commit_only_touches_its_own_root() {
        let dir = tempdir().unwrap();
        let mut store = open(dir.path());
        let photos = RootId::from_string("photos");
        let music = RootId::from_string("music");
        store
            .commit(&photos, &snapshot(&[record("photos", "/p/1.jpg", 1)]))
            .unwrap();
        store
            .commit(&music, &snapshot(&[record("music", "/m/1.flac", 2)]))
            .unwrap();

        store.commit(&photos, &Snapshot::new()).unwrap();
        assert!(store.load_all(Some(&photos)).unwrap().is_empty());
        assert_eq!(store.load_all(Some(&music)).unwrap().len(), 1);
        assert_eq!(store.load_all(None).unwrap().len(), 1);
    }

    #[test]
    fn failed_commit_leaves_previous_state_visible() {
        let dir = tempdir().unwrap();
        let mut store = open(dir.path());
        let root = RootId::from_string("data");
        let before = snapshot(&[record("data", "/d/a", 1), record("data", "/d/b", 2)]);
        store.commit(&root, &before).unwrap();
        store
            .connection
            .execute_batch(
                "CREATE TRIGGER poison BEFORE INSERT ON files
                 WHEN NEW.path LIKE '%poison%'
                 BEGIN SELECT RAISE(ABORT, 'simulated disk failure'); END;",
            )
            .unwrap();

        let after = snapshot(&[
            record("data", "/d/a", 100),
            record("data", "/d/new", 5),
            record("data", "/d/poison", 7),
        ]);
        let err = store.commit(&root, &after).unwrap_err();
        assert!(matches!(err, StoreError::Sql(_)));
        assert_eq!(store.load_all(Some(&root)).unwrap(), before);
        assert!(store.last_scan_completed_at(&root).unwrap().is_some());
    }

    #[test]
    fn mismatched_root_is_rejected_before_writing() {
        let dir = tempdir().unwrap();
        let mut store = open(dir.path());
        let root = RootId::from_string("data");
        let err = store
            .commit(&root, &snapshot(&[record("other", "/d/a", 1)]))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord { .. }));
        assert!(store.load_all(None).unwrap().is_empty());
    }

    #[test]
    fn read_only_store_refuses_commit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");
        drop(StateStore::open(&path).unwrap());
        let mut store = StateStore::open_read_only(&path).unwrap();
        let err = store
            .commit(&RootId::from_string("data"), &Snapshot::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::ReadOnly));
    }

    #[test]
    fn list_roots_reports_counts_and_commit_time() {
        let dir = tempdir().unwrap();
        let mut store = open(dir.path());
        let root = RootId::from_string("data");
        store
            .commit(
                &root,
                &snapshot(&[record("data", "/d/a", 1), record("data", "/d/b", 2)]),
            )
            .unwrap();

        let roots = store.list_roots().unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].root_id, root);
        assert_eq!(roots[0].file_count, 2);
        assert!(roots[0].last_scan_completed_at.is_some());
    }

    #[test]
    fn list_roots_includes_roots_committed_empty() {
        let dir = tempdir().unwrap();
        let mut store = open(dir.path());
        store
            .commit(&RootId::from_string("full"), &snapshot(&[record("full", "/f/a", 1)]))
            .unwrap();
        store
            .commit(&RootId::from_string("empty"), &Snapshot::new())
            .unwrap();

        let roots = store.list_roots().unwrap();
        let ids: Vec<&str> = roots.iter().map(|summary| summary.root_id.as_str()).collect();
        assert_eq!(ids, vec!["empty", "full"]);
        assert_eq!(roots[0].file_count, 0);
        assert!(roots[0].last_scan_completed_at.is_some());
        assert_eq!(roots[1].file_count, 1);
    }
}
