use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::app_dirs;

use super::{CONFIG_FILE_NAME, ConfigError, TrackerConfig, map_app_dir_error};

/// Default config file location; its directory is created when missing.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(app_dirs::config_dir()
        .map_err(map_app_dir_error)?
        .join(CONFIG_FILE_NAME))
}

/// Load the config at `path` and check it before handing it out.
pub fn load_from(path: &Path) -> Result<TrackerConfig, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(ConfigError::Missing {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let config: TrackerConfig = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}
