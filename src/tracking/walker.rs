//! Deterministic, lazy traversal of registered roots.
//!
//! Order is depth-first pre-order: roots in the given order, a directory's own
//! record before its children, children sorted by file name. Symlinks are
//! recorded but never followed. Unreadable entries are skipped and counted;
//! entries that vanish mid-walk are dropped silently.

use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, warn};

use super::capture::{AccessError, CaptureOptions, capture_entry, device_id};
use super::record::{FileKind, FileRecord};
use super::{RegisteredRoot, RootId};

/// Root-level failures that prevent walking a root at all.
#[derive(Debug, Error)]
pub enum WalkError {
    #[error("Root is not an accessible directory: {path}")]
    InvalidRoot {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },
    #[error("Root {path} is on device {found}, expected {expected}")]
    DeviceMismatch {
        path: PathBuf,
        expected: u64,
        found: u64,
    },
    #[error("Failed to list root {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Produces fresh walks over registered roots.
#[derive(Debug, Clone, Default)]
pub struct Walker {
    options: CaptureOptions,
    exclusions: Vec<PathBuf>,
}

impl Walker {
    pub fn new(options: CaptureOptions) -> Self {
        Self {
            options,
            exclusions: Vec::new(),
        }
    }

    /// Never record these paths or anything below them.
    pub fn with_exclusions(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.exclusions
            .extend(paths.into_iter().map(|path| canonical_or_parent(&path)));
        self
    }

    /// Walk every root in order. Each call starts over from the first root.
    pub fn walk<'w>(&'w self, roots: &'w [RegisteredRoot]) -> Walk<'w> {
        Walk {
            walker: self,
            roots: roots.iter(),
            current: None,
            skipped: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    /// Start walking a single root.
    pub fn walk_root(&self, root: &RegisteredRoot) -> Result<RootWalk<'_>, WalkError> {
        let base = root
            .path
            .canonicalize()
            .map_err(|source| WalkError::InvalidRoot {
                path: root.path.clone(),
                source: Some(source),
            })?;
        let meta = fs::metadata(&base).map_err(|source| WalkError::InvalidRoot {
            path: base.clone(),
            source: Some(source),
        })?;
        if !meta.is_dir() {
            return Err(WalkError::InvalidRoot {
                path: base,
                source: None,
            });
        }
        if let (Some(expected), Some(found)) = (root.device, device_id(&meta))
            && expected != found
        {
            return Err(WalkError::DeviceMismatch {
                path: base,
                expected,
                found,
            });
        }
        let mut walk = RootWalk {
            walker: self,
            root_id: root.id.clone(),
            device: root.device,
            stack: Vec::new(),
            skipped: 0,
            unreadable: Vec::new(),
        };
        let children = walk
            .list_dir(&base)
            .map_err(|source| WalkError::Unreadable {
                path: base.clone(),
                source,
            })?;
        walk.stack.push(children.into_iter());
        Ok(walk)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.exclusions
            .iter()
            .any(|excluded| path.starts_with(excluded))
    }
}

/// Lazy walk of one root.
pub struct RootWalk<'w> {
    walker: &'w Walker,
    root_id: RootId,
    device: Option<u64>,
    stack: Vec<std::vec::IntoIter<PathBuf>>,
    skipped: usize,
    unreadable: Vec<PathBuf>,
}

impl RootWalk<'_> {
    /// Entries skipped so far because they could not be captured.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn root_id(&self) -> &RootId {
        &self.root_id
    }

    /// Entries that exist but could not be read, and directories whose
    /// listing failed. Whatever was recorded at or below them is unknown
    /// this walk, not gone.
    pub fn unreadable(&self) -> &[PathBuf] {
        &self.unreadable
    }

    fn list_dir(&mut self, dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
        let mut children = Vec::new();
        for entry_result in fs::read_dir(dir)? {
            match entry_result {
                Ok(entry) => children.push(entry.path()),
                Err(err) => {
                    warn!(
                        dir = %dir.display(),
                        error = %err,
                        "Failed to read directory entry during walk"
                    );
                    self.skipped += 1;
                }
            }
        }
        children.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(children)
    }

    fn descend(&mut self, dir: &Path) {
        match self.list_dir(dir) {
            Ok(children) => self.stack.push(children.into_iter()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "Directory vanished during walk");
            }
            Err(err) => {
                warn!(
                    dir = %dir.display(),
                    error = %err,
                    "Failed to read directory during walk"
                );
                self.skipped += 1;
                self.unreadable.push(dir.to_path_buf());
            }
        }
    }

    fn skip(&mut self, err: AccessError) {
        match &err {
            AccessError::Vanished { path } => {
                debug!(path = %path.display(), "Entry vanished during walk");
                return;
            }
            AccessError::PermissionDenied { path } | AccessError::Io { path, .. } => {
                self.unreadable.push(path.clone());
            }
            AccessError::NonUtf8Path { .. } | AccessError::ForeignDevice { .. } => {}
        }
        warn!(root = %self.root_id, error = %err, "Skipping entry");
        self.skipped += 1;
    }
}

impl Iterator for RootWalk<'_> {
    type Item = FileRecord;

    fn next(&mut self) -> Option<FileRecord> {
        loop {
            let frame = self.stack.last_mut()?;
            let Some(path) = frame.next() else {
                self.stack.pop();
                continue;
            };
            if self.walker.is_excluded(&path) {
                continue;
            }
            let captured = match capture_entry(&path, &self.root_id, &self.walker.options) {
                Ok(captured) => captured,
                Err(err) => {
                    self.skip(err);
                    continue;
                }
            };
            if let (Some(expected), Some(found)) = (self.device, captured.device)
                && expected != found
            {
                self.skip(AccessError::ForeignDevice {
                    path,
                    expected,
                    found,
                });
                continue;
            }
            if captured.record.kind == FileKind::Directory {
                self.descend(&path);
            }
            return Some(captured.record);
        }
    }
}

/// Lazy walk across several roots, in order.
pub struct Walk<'w> {
    walker: &'w Walker,
    roots: std::slice::Iter<'w, RegisteredRoot>,
    current: Option<RootWalk<'w>>,
    skipped: BTreeMap<RootId, usize>,
    failures: Vec<(RootId, WalkError)>,
}

impl Walk<'_> {
    /// Skipped entries for a root walked so far.
    pub fn skipped(&self, root: &RootId) -> usize {
        let current = self
            .current
            .as_ref()
            .filter(|walk| walk.root_id() == root)
            .map_or(0, RootWalk::skipped);
        self.skipped.get(root).copied().unwrap_or(0) + current
    }

    /// Roots that could not be walked at all.
    pub fn failures(&self) -> &[(RootId, WalkError)] {
        &self.failures
    }

    fn finish_current(&mut self) {
        if let Some(done) = self.current.take() {
            *self.skipped.entry(done.root_id.clone()).or_default() += done.skipped;
        }
    }
}

impl Iterator for Walk<'_> {
    type Item = FileRecord;

    fn next(&mut self) -> Option<FileRecord> {
        loop {
            if let Some(current) = self.current.as_mut() {
                if let Some(record) = current.next() {
                    return Some(record);
                }
                self.finish_current();
            }
            let root = self.roots.next()?;
            match self.walker.walk_root(root) {
                Ok(walk) => self.current = Some(walk),
                Err(err) => {
                    warn!(root = %root.id, error = %err, "Cannot walk root");
                    self.failures.push((root.id.clone(), err));
                }
            }
        }
    }
}

fn canonical_or_parent(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|parent| parent.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}
