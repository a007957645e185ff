use serde::{Deserialize, Serialize};

use super::RootId;

/// Type of filesystem entry captured during a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    Other,
}

impl FileKind {
    /// Column value used by the state store.
    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Regular => "regular",
            FileKind::Directory => "directory",
            FileKind::Symlink => "symlink",
            FileKind::Other => "other",
        }
    }

    /// Parse a stored column value.
    pub fn from_column(value: &str) -> Option<Self> {
        match value {
            "regular" => Some(FileKind::Regular),
            "directory" => Some(FileKind::Directory),
            "symlink" => Some(FileKind::Symlink),
            "other" => Some(FileKind::Other),
            _ => None,
        }
    }

    pub(crate) fn from_file_type(file_type: std::fs::FileType) -> Self {
        if file_type.is_symlink() {
            FileKind::Symlink
        } else if file_type.is_dir() {
            FileKind::Directory
        } else if file_type.is_file() {
            FileKind::Regular
        } else {
            FileKind::Other
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable metadata snapshot of one tracked path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute, normalized path; unique within its root.
    pub path: String,
    /// Root that owns this path.
    pub root_id: RootId,
    /// Size in bytes at capture time.
    pub size: u64,
    /// Modification time in epoch nanoseconds, truncated to the capture resolution.
    pub modified_ns: i64,
    pub kind: FileKind,
}

impl FileRecord {
    /// True when size, modification time or kind differ.
    ///
    /// Path and root are identity, not state, and are not compared.
    pub fn differs_from(&self, other: &FileRecord) -> bool {
        self.size != other.size || self.modified_ns != other.modified_ns || self.kind != other.kind
    }
}
