use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use super::{ConfigError, TrackerConfig};

/// Create a new config at `path` pointing at `database` and `log_folder`.
///
/// Refuses to overwrite an existing file. The database is created if missing
/// and the log folder must already exist.
pub fn init(path: &Path, database: &Path, log_folder: &Path) -> Result<TrackerConfig, ConfigError> {
    if path.exists() {
        return Err(ConfigError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    let mut config = TrackerConfig::new(database, log_folder);
    config.set_database(database)?;
    config.set_log_folder(log_folder)?;
    save_to_path(&config, path)?;
    Ok(config)
}

/// Validate and write the config as TOML, replacing `path` atomically.
pub fn save_to_path(config: &TrackerConfig, path: &Path) -> Result<(), ConfigError> {
    config.validate()?;
    let data = toml::to_string_pretty(config).map_err(|source| ConfigError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    atomic_write(path, data.as_bytes())
}

/// Write through a sibling temp file so a crash never leaves a half-written config.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ConfigError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|source| ConfigError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut file = NamedTempFile::new_in(dir).map_err(write_err)?;
    file.write_all(data).map_err(write_err)?;
    file.as_file().sync_all().map_err(write_err)?;
    file.persist(path).map_err(|err| write_err(err.error))?;
    sync_parent_dir(dir)
}

#[cfg(unix)]
fn sync_parent_dir(dir: &Path) -> Result<(), ConfigError> {
    std::fs::File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(|source| ConfigError::Write {
            path: dir.to_path_buf(),
            source,
        })
}

#[cfg(not(unix))]
fn sync_parent_dir(_dir: &Path) -> Result<(), ConfigError> {
    Ok(())
}
