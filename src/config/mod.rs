//! Tracker configuration: which roots to scan, where the state store and
//! logs live, and how modification times are compared.
//!
//! Stored as TOML under the application config directory. Older JSON
//! configs can be imported once with [`import_legacy`].

use std::path::PathBuf;

use thiserror::Error;

use crate::app_dirs;
use crate::tracking::StoreError;

mod legacy;
mod load;
mod save;
mod types;

#[cfg(test)]
mod tests;

/// Default filename used to store the tracker configuration.
pub const CONFIG_FILE_NAME: &str = "config.toml";

pub use legacy::import_legacy;
pub use load::{config_path, load_from};
pub use save::{init, save_to_path};
pub use types::{RootConfig, TrackerConfig};

/// Errors that may occur while loading, editing or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to create the config directory.
    #[error("Unable to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to read a config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to write a config file.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse TOML config.
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Failed to parse a legacy JSON config.
    #[error("Invalid legacy config at {path}: {source}")]
    ParseJson {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// Failed to serialize config to TOML.
    #[error("Failed to serialize config to TOML at {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
    /// No config file at the expected location.
    #[error("No config file at {path}; create one with `filetrack config init`")]
    Missing { path: PathBuf },
    /// Refusing to overwrite an existing config file.
    #[error("Config file already exists at {path}; won't clobber it")]
    AlreadyExists { path: PathBuf },
    /// A path that must be a directory is not one.
    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },
    /// Two registered roots would track the same paths.
    #[error("Roots overlap: {first} and {second}")]
    OverlappingRoots { first: PathBuf, second: PathBuf },
    /// Two roots share an id.
    #[error("Root id {0} is registered more than once")]
    DuplicateRootId(String),
    /// No root with the given id.
    #[error("Unknown root {0}")]
    UnknownRoot(String),
    /// The database location is unusable.
    #[error("Database {path} is unusable: {source}")]
    Database { path: PathBuf, source: StoreError },
    /// The configuration is internally inconsistent.
    #[error("Invalid config: {0}")]
    Invalid(String),
    /// No usable config directory found.
    #[error("No suitable config directory found")]
    NoConfigDir,
}

fn map_app_dir_error(error: app_dirs::AppDirError) -> ConfigError {
    match error {
        app_dirs::AppDirError::NoHome => ConfigError::NoConfigDir,
        app_dirs::AppDirError::CreateDir { path, source } => ConfigError::CreateDir { path, source },
    }
}
