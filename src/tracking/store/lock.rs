use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use super::StoreError;
use super::util::create_parent_if_needed;

/// Exclusive advisory lock that keeps two scans off the same store.
///
/// Released when dropped.
#[derive(Debug)]
pub struct ScanLock {
    file: File,
    path: PathBuf,
}

impl ScanLock {
    /// Take the lock next to `db_path` without waiting.
    pub fn acquire(db_path: &Path) -> Result<Self, StoreError> {
        let path = lock_path(db_path);
        create_parent_if_needed(&path)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        // Fully qualified so newer std's File::try_lock_exclusive is not picked.
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                debug!("Acquired scan lock {}", path.display());
                Ok(Self { file, path })
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Err(StoreError::Locked {
                path: db_path.to_path_buf(),
            }),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScanLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            debug!("Failed to release scan lock {}: {err}", self.path.display());
        }
    }
}

/// `/data/state.db` locks through `/data/state.db.lock`.
pub(super) fn lock_path(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_lock_is_refused_until_first_drops() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("state.db");

        let first = ScanLock::acquire(&db).unwrap();
        assert!(first.path().is_file());
        let err = ScanLock::acquire(&db).unwrap_err();
        assert!(matches!(err, StoreError::Locked { .. }));

        drop(first);
        assert!(ScanLock::acquire(&db).is_ok());
    }

    #[test]
    fn lock_path_appends_suffix() {
        assert_eq!(
            lock_path(Path::new("/data/mydb")),
            PathBuf::from("/data/mydb.lock")
        );
        assert_eq!(
            lock_path(Path::new("/data/my.data.db")),
            PathBuf::from("/data/my.data.db.lock")
        );
    }
}
