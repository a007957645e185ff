#![allow(dead_code)]

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

/// Temporary directory tree with helpers for laying out roots and editing files.
pub struct Tree {
    dir: TempDir,
}

impl Tree {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn dir(&self, relative: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        fs::create_dir_all(&path).expect("create dir");
        path
    }

    pub fn file(&self, relative: &str, body: &[u8]) -> PathBuf {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, body).expect("write file");
        path
    }

    pub fn remove(&self, relative: &str) {
        let path = self.dir.path().join(relative);
        if path.is_dir() {
            fs::remove_dir_all(&path).expect("remove dir");
        } else {
            fs::remove_file(&path).expect("remove file");
        }
    }

    /// Move a file's modification time back without touching its contents.
    pub fn age(&self, relative: &str, by: Duration) {
        let path = self.dir.path().join(relative);
        let modified = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .expect("read mtime");
        let file = File::options().write(true).open(&path).expect("open for mtime");
        file.set_modified(modified - by).expect("set mtime");
    }

    pub fn set_mtime(&self, relative: &str, at: SystemTime) {
        let path = self.dir.path().join(relative);
        let file = File::options().write(true).open(&path).expect("open for mtime");
        file.set_modified(at).expect("set mtime");
    }
}

/// Canonical string form of a path as it appears in records and history.
pub fn canonical(path: &Path) -> String {
    path.canonicalize()
        .expect("canonicalize")
        .to_str()
        .expect("utf-8 path")
        .to_string()
}
