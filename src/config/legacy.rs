use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use super::types::RootConfig;
use super::{ConfigError, TrackerConfig};
use crate::tracking::MtimeResolution;
use crate::tracking::capture::device_id;

/// JSON layout written by the older tracker.
#[derive(Debug, Deserialize)]
struct LegacyConfig {
    config_last_changed: i64,
    database: Option<String>,
    log_folder: Option<String>,
    /// Root path mapped to the filesystem id recorded at registration.
    #[serde(default)]
    filesystems_to_scan: BTreeMap<String, serde_json::Value>,
}

/// Convert a legacy JSON config into the current layout.
///
/// Root ids are derived from each root's final path component. Legacy
/// filesystem ids are not comparable with device ids, so the device of
/// each root that still exists is checked again instead.
pub fn import_legacy(path: &Path) -> Result<TrackerConfig, ConfigError> {
    let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let legacy: LegacyConfig =
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::ParseJson {
            path: path.to_path_buf(),
            source,
        })?;
    let database = legacy
        .database
        .ok_or_else(|| ConfigError::Invalid("legacy config has no database".into()))?;
    let log_folder = legacy
        .log_folder
        .ok_or_else(|| ConfigError::Invalid("legacy config has no log folder".into()))?;

    let mut config = TrackerConfig {
        database: PathBuf::from(database),
        log_folder: PathBuf::from(log_folder),
        mtime_resolution: MtimeResolution::default(),
        config_last_changed_ms: legacy.config_last_changed,
        roots: Vec::new(),
    };
    for root_path in legacy.filesystems_to_scan.keys() {
        let root_path = PathBuf::from(root_path);
        let device = match std::fs::metadata(&root_path) {
            Ok(meta) => device_id(&meta),
            Err(err) => {
                warn!("Legacy root {} is not accessible: {err}", root_path.display());
                None
            }
        };
        let id = config.derive_root_id(&root_path);
        config.roots.push(RootConfig {
            id,
            path: root_path,
            device,
        });
    }
    config.validate()?;
    info!(
        "Imported {} roots from legacy config {}",
        config.roots.len(),
        path.display()
    );
    Ok(config)
}
