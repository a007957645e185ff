use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::ConfigError;
use crate::tracking::capture::device_id;
use crate::tracking::{MtimeResolution, RegisteredRoot, RootId, StateStore};

/// One directory registered for tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootConfig {
    pub id: RootId,
    pub path: PathBuf,
    /// Device the root was registered on. Scans refuse the root if it moves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<u64>,
}

impl RootConfig {
    pub fn to_registered(&self) -> RegisteredRoot {
        RegisteredRoot::new(self.id.clone(), &self.path).with_device(self.device)
    }
}

/// Persisted tracker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// State store location.
    pub database: PathBuf,
    /// Folder receiving the change history and per-run logs.
    pub log_folder: PathBuf,
    #[serde(default)]
    pub mtime_resolution: MtimeResolution,
    /// Milliseconds since the epoch of the last edit.
    #[serde(default)]
    pub config_last_changed_ms: i64,
    #[serde(default, rename = "root")]
    pub roots: Vec<RootConfig>,
}

impl TrackerConfig {
    /// Config with no roots. Paths are taken as given; see `set_database`
    /// and `set_log_folder` for the validating setters.
    pub fn new(database: impl Into<PathBuf>, log_folder: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            log_folder: log_folder.into(),
            mtime_resolution: MtimeResolution::default(),
            config_last_changed_ms: now_ms(),
            roots: Vec::new(),
        }
    }

    /// Check the invariants the scanner relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database path is empty".into()));
        }
        if self.log_folder.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("log folder is empty".into()));
        }
        for (index, root) in self.roots.iter().enumerate() {
            for other in &self.roots[index + 1..] {
                if root.id == other.id {
                    return Err(ConfigError::DuplicateRootId(root.id.to_string()));
                }
                if root.path.starts_with(&other.path) || other.path.starts_with(&root.path) {
                    return Err(ConfigError::OverlappingRoots {
                        first: root.path.clone(),
                        second: other.path.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn root(&self, id: &str) -> Option<&RootConfig> {
        self.roots.iter().find(|root| root.id.as_str() == id)
    }

    /// Every registered root, in registration order.
    pub fn registered_roots(&self) -> Vec<RegisteredRoot> {
        self.roots.iter().map(RootConfig::to_registered).collect()
    }

    /// The roots named by `ids`, or all of them when `ids` is empty.
    pub fn select_roots(&self, ids: &[String]) -> Result<Vec<RegisteredRoot>, ConfigError> {
        if ids.is_empty() {
            return Ok(self.registered_roots());
        }
        ids.iter()
            .map(|id| {
                self.root(id)
                    .map(RootConfig::to_registered)
                    .ok_or_else(|| ConfigError::UnknownRoot(id.clone()))
            })
            .collect()
    }

    /// Register `path` for tracking.
    ///
    /// Returns the new root's id, or `None` when the directory is already registered.
    pub fn add_root(&mut self, path: &Path, id: Option<String>) -> Result<Option<RootId>, ConfigError> {
        let meta = fs::metadata(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(ConfigError::NotADirectory {
                path: path.to_path_buf(),
            });
        }
        let resolved = path.canonicalize().map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if self.roots.iter().any(|root| root.path == resolved) {
            warn!("Root {} is already registered; ignoring", resolved.display());
            return Ok(None);
        }
        let id = match id {
            Some(id) if self.root(&id).is_some() => return Err(ConfigError::DuplicateRootId(id)),
            Some(id) => RootId::from_string(id),
            None => self.derive_root_id(&resolved),
        };
        let mut candidate = self.clone();
        candidate.roots.push(RootConfig {
            id: id.clone(),
            path: resolved,
            device: device_id(&meta),
        });
        candidate.validate()?;
        *self = candidate;
        self.touch();
        info!("Registered root {id}");
        Ok(Some(id))
    }

    /// Unregister a root by id or path. Returns false when nothing matched.
    pub fn remove_root(&mut self, id_or_path: &str) -> bool {
        // The directory may already be gone, so fall back to the literal path.
        let as_path = Path::new(id_or_path);
        let resolved = as_path
            .canonicalize()
            .unwrap_or_else(|_| as_path.to_path_buf());
        let before = self.roots.len();
        self.roots
            .retain(|root| root.id.as_str() != id_or_path && root.path != resolved);
        if self.roots.len() == before {
            warn!("Root {id_or_path} wasn't found in the config; ignoring");
            return false;
        }
        self.touch();
        true
    }

    /// Point at a new state store, creating it when missing.
    pub fn set_database(&mut self, path: &Path) -> Result<(), ConfigError> {
        if path.exists() && !path.is_file() {
            return Err(ConfigError::Invalid(format!(
                "database path {} is not a file",
                path.display()
            )));
        }
        // Opening creates a missing store and rejects anything that is not one.
        StateStore::open(path).map_err(|source| ConfigError::Database {
            path: path.to_path_buf(),
            source,
        })?;
        self.database = path.canonicalize().map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.touch();
        Ok(())
    }

    /// Point at a new log folder, which must already exist.
    pub fn set_log_folder(&mut self, path: &Path) -> Result<(), ConfigError> {
        if !path.is_dir() {
            return Err(ConfigError::NotADirectory {
                path: path.to_path_buf(),
            });
        }
        let non_empty = fs::read_dir(path)
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?
            .next()
            .is_some();
        if non_empty {
            warn!("Log folder {} already contains files", path.display());
        }
        self.log_folder = path.canonicalize().map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.touch();
        Ok(())
    }

    pub(super) fn derive_root_id(&self, path: &Path) -> RootId {
        let base = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "root".to_string());
        let mut candidate = base.clone();
        let mut suffix = 2;
        while self.root(&candidate).is_some() {
            candidate = format!("{base}-{suffix}");
            suffix += 1;
        }
        RootId::from_string(candidate)
    }

    fn touch(&mut self) {
        self.config_last_changed_ms = now_ms();
    }
}

pub(super) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}
