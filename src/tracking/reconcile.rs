use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{FileRecord, RootId};

/// One root's records keyed by path. Ordered so iteration is deterministic.
pub type Snapshot = BTreeMap<String, FileRecord>;

/// Classification of a detected difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Removed => "removed",
            ChangeKind::Modified => "modified",
        }
    }
}

/// Before/after payload of a change. The variant makes an entry with
/// neither side, or a modification missing one side, unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Added { after: FileRecord },
    Removed { before: FileRecord },
    Modified { before: FileRecord, after: FileRecord },
}

/// A single difference found by one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEntry {
    pub root_id: RootId,
    pub path: String,
    /// When the owning scan started.
    pub scan_started_at: OffsetDateTime,
    pub change: Change,
}

impl ChangeEntry {
    pub fn kind(&self) -> ChangeKind {
        match self.change {
            Change::Added { .. } => ChangeKind::Added,
            Change::Removed { .. } => ChangeKind::Removed,
            Change::Modified { .. } => ChangeKind::Modified,
        }
    }

    pub fn before(&self) -> Option<&FileRecord> {
        match &self.change {
            Change::Added { .. } => None,
            Change::Removed { before } | Change::Modified { before, .. } => Some(before),
        }
    }

    pub fn after(&self) -> Option<&FileRecord> {
        match &self.change {
            Change::Removed { .. } => None,
            Change::Added { after } | Change::Modified { after, .. } => Some(after),
        }
    }
}

/// Per-kind totals of a change set.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
}

impl ChangeCounts {
    pub fn from_changes(changes: &[ChangeEntry]) -> Self {
        let mut counts = Self::default();
        for entry in changes {
            counts.record(entry.kind());
        }
        counts
    }

    pub fn record(&mut self, kind: ChangeKind) {
        match kind {
            ChangeKind::Added => self.added += 1,
            ChangeKind::Removed => self.removed += 1,
            ChangeKind::Modified => self.modified += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.added + self.removed + self.modified
    }

    pub fn merge(&mut self, other: ChangeCounts) {
        self.added += other.added;
        self.removed += other.removed;
        self.modified += other.modified;
    }
}

/// Compute the change set that turns `previous` into `current`.
///
/// Removed entries come first, then added, then modified, each group sorted
/// by path. Size, modification time and kind are compared exactly.
pub fn diff(
    previous: &Snapshot,
    current: &Snapshot,
    root_id: &RootId,
    scan_started_at: OffsetDateTime,
) -> Vec<ChangeEntry> {
    let entry = |path: &str, change: Change| ChangeEntry {
        root_id: root_id.clone(),
        path: path.to_string(),
        scan_started_at,
        change,
    };

    let mut removed = Vec::new();
    let mut modified = Vec::new();
    for (path, before) in previous {
        match current.get(path) {
            None => removed.push(entry(
                path,
                Change::Removed {
                    before: before.clone(),
                },
            )),
            Some(after) if before.differs_from(after) => modified.push(entry(
                path,
                Change::Modified {
                    before: before.clone(),
                    after: after.clone(),
                },
            )),
            Some(_) => {}
        }
    }
    let added = current
        .iter()
        .filter(|(path, _)| !previous.contains_key(*path))
        .map(|(path, after)| {
            entry(
                path,
                Change::Added {
                    after: after.clone(),
                },
            )
        });

    let mut changes = removed;
    changes.extend(added);
    changes.append(&mut modified);
    changes
}

/// Copy into `current` the prior records at or below each `unreadable` path
/// that the walk could not produce, so entries that still exist but could
/// not be read this time show up as neither removed nor modified.
///
/// Returns the number of records carried over.
pub fn carry_forward(previous: &Snapshot, current: &mut Snapshot, unreadable: &[PathBuf]) -> usize {
    let mut carried = 0;
    for held in unreadable {
        let Some(prefix) = held.to_str() else {
            continue;
        };
        // "a.txt" sorts between "a" and "a/x", so filter on components.
        let under = previous
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(path, _)| path.starts_with(prefix))
            .filter(|(path, _)| Path::new(path.as_str()).starts_with(held));
        for (path, record) in under {
            if !current.contains_key(path) {
                current.insert(path.clone(), record.clone());
                carried += 1;
            }
        }
    }
    carried
}
