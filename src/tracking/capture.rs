use std::{
    fs::{self, Metadata},
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::RootId;
use super::record::{FileKind, FileRecord};

/// Per-entry failures while capturing metadata. Recoverable: the walker skips and counts them.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The entry disappeared between discovery and capture.
    #[error("Path vanished before it could be read: {path}")]
    Vanished { path: PathBuf },
    /// Metadata or content access was denied.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },
    /// Any other IO failure.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The path cannot be stored as a UTF-8 key.
    #[error("Path is not valid UTF-8: {path}")]
    NonUtf8Path { path: PathBuf },
    /// The entry lives on a different device than its pinned root.
    #[error("Entry {path} is on device {found}, expected {expected}")]
    ForeignDevice {
        path: PathBuf,
        expected: u64,
        found: u64,
    },
}

impl AccessError {
    pub(crate) fn from_io(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            ErrorKind::NotFound => AccessError::Vanished {
                path: path.to_path_buf(),
            },
            ErrorKind::PermissionDenied => AccessError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => AccessError::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

/// Resolution modification times are truncated to before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MtimeResolution {
    Seconds,
    Milliseconds,
    Microseconds,
    #[default]
    Nanoseconds,
}

impl MtimeResolution {
    fn unit_ns(self) -> i64 {
        match self {
            MtimeResolution::Seconds => 1_000_000_000,
            MtimeResolution::Milliseconds => 1_000_000,
            MtimeResolution::Microseconds => 1_000,
            MtimeResolution::Nanoseconds => 1,
        }
    }

    /// Truncate toward zero; never rounds up.
    pub fn truncate(self, nanos: i64) -> i64 {
        let unit = self.unit_ns();
        nanos / unit * unit
    }
}

/// Knobs for metadata capture.
#[derive(Debug, Clone, Copy)]
pub struct CaptureOptions {
    pub mtime_resolution: MtimeResolution,
    /// Open regular files once to check read access so unreadable files are skipped.
    pub verify_readable: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            mtime_resolution: MtimeResolution::default(),
            verify_readable: true,
        }
    }
}

/// Metadata plus the device id the walker uses for mount detection.
pub(crate) struct Captured {
    pub(crate) record: FileRecord,
    pub(crate) device: Option<u64>,
}

/// Capture an immutable metadata snapshot of `path` without following symlinks.
pub fn capture(
    path: &Path,
    root_id: &RootId,
    options: &CaptureOptions,
) -> Result<FileRecord, AccessError> {
    capture_entry(path, root_id, options).map(|captured| captured.record)
}

pub(crate) fn capture_entry(
    path: &Path,
    root_id: &RootId,
    options: &CaptureOptions,
) -> Result<Captured, AccessError> {
    let key = path
        .to_str()
        .ok_or_else(|| AccessError::NonUtf8Path {
            path: path.to_path_buf(),
        })?
        .to_string();
    let meta = fs::symlink_metadata(path).map_err(|source| AccessError::from_io(path, source))?;
    let kind = FileKind::from_file_type(meta.file_type());
    if kind == FileKind::Regular && options.verify_readable {
        fs::File::open(path).map_err(|source| AccessError::from_io(path, source))?;
    }
    let modified = meta
        .modified()
        .map_err(|source| AccessError::from_io(path, source))?;
    Ok(Captured {
        record: FileRecord {
            path: key,
            root_id: root_id.clone(),
            size: meta.len(),
            modified_ns: options.mtime_resolution.truncate(to_nanos(modified)),
            kind,
        },
        device: device_id(&meta),
    })
}

/// Device id of an already-read metadata block, when the platform exposes one.
pub(crate) fn device_id(meta: &Metadata) -> Option<u64> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Some(meta.dev())
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        None
    }
}

fn to_nanos(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_nanos().min(i64::MAX as u128) as i64,
        Err(before) => -(before.duration().as_nanos().min(i64::MAX as u128) as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn root() -> RootId {
        RootId::from_string("root")
    }

    #[test]
    fn captures_regular_file_size_and_kind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("one.txt");
        std::fs::write(&path, b"hello").unwrap();

        let record = capture(&path, &root(), &CaptureOptions::default()).unwrap();
        assert_eq!(record.size, 5);
        assert_eq!(record.kind, FileKind::Regular);
        assert_eq!(record.path, path.to_str().unwrap());
        assert_eq!(record.root_id, root());
    }

    #[test]
    fn captures_directory_kind() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();

        let record = capture(&nested, &root(), &CaptureOptions::default()).unwrap();
        assert_eq!(record.kind, FileKind::Directory);
    }

    #[test]
    fn missing_path_reports_vanished() {
        let dir = tempdir().unwrap();
        let err = capture(
            &dir.path().join("gone.txt"),
            &root(),
            &CaptureOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AccessError::Vanished { .. }));
    }

    #[test]
    fn truncates_modified_time_to_resolution() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("one.txt");
        std::fs::write(&path, b"x").unwrap();
        let stamp = UNIX_EPOCH + Duration::new(1_700_000_000, 987_654_321);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(stamp)
            .unwrap();

        let options = CaptureOptions {
            mtime_resolution: MtimeResolution::Seconds,
            ..CaptureOptions::default()
        };
        let record = capture(&path, &root(), &options).unwrap();
        assert_eq!(record.modified_ns, 1_700_000_000_000_000_000);
    }

    #[test]
    fn truncation_never_rounds_up() {
        assert_eq!(MtimeResolution::Milliseconds.truncate(1_999_999), 1_000_000);
        assert_eq!(MtimeResolution::Seconds.truncate(-1_500_000_000), -1_000_000_000);
        assert_eq!(MtimeResolution::Nanoseconds.truncate(42), 42);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_captured_without_following() {
        use std::os::unix::fs as unix_fs;

        let dir = tempdir().unwrap();
        let target = dir.path().join("target.txt");
        std::fs::write(&target, vec![7u8; 4096]).unwrap();
        let link = dir.path().join("link");
        unix_fs::symlink(&target, &link).unwrap();

        let record = capture(&link, &root(), &CaptureOptions::default()).unwrap();
        assert_eq!(record.kind, FileKind::Symlink);
        assert_eq!(record.size, target.as_os_str().len() as u64);
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_is_still_captured() {
        use std::os::unix::fs as unix_fs;

        let dir = tempdir().unwrap();
        let link = dir.path().join("dangling");
        unix_fs::symlink(dir.path().join("nowhere"), &link).unwrap();

        let record = capture(&link, &root(), &CaptureOptions::default()).unwrap();
        assert_eq!(record.kind, FileKind::Symlink);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_reports_permission_denied() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("secret.txt");
        std::fs::write(&path, b"secret").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o000)).unwrap();
        if std::fs::File::open(&path).is_ok() {
            // Privileged users bypass mode bits.
            return;
        }

        let err = capture(&path, &root(), &CaptureOptions::default()).unwrap_err();
        assert!(matches!(err, AccessError::PermissionDenied { .. }));

        let relaxed = CaptureOptions {
            verify_readable: false,
            ..CaptureOptions::default()
        };
        assert!(capture(&path, &root(), &relaxed).is_ok());
    }
}
