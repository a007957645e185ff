//! Where filetrack keeps its own files when the user doesn't say.
//!
//! The config lives in the platform config directory (`~/.config/filetrack`
//! on Linux). Run logs written before any config exists go to the local data
//! directory. Setting `FILETRACK_CONFIG_HOME` puts both under one folder.

use std::path::PathBuf;

use directories::ProjectDirs;
use thiserror::Error;

pub const APP_DIR_NAME: &str = "filetrack";
pub const CONFIG_HOME_ENV: &str = "FILETRACK_CONFIG_HOME";

#[derive(Debug, Error)]
pub enum AppDirError {
    #[error("No home directory found; pass --config or set {CONFIG_HOME_ENV}")]
    NoHome,
    #[error("Failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Clone, Copy)]
enum Purpose {
    Config,
    Logs,
}

/// Directory holding the default `config.toml`, created when missing.
pub fn config_dir() -> Result<PathBuf, AppDirError> {
    ensure(resolve(Purpose::Config)?)
}

/// Run-log directory used until a config names a log folder.
pub fn fallback_logs_dir() -> Result<PathBuf, AppDirError> {
    ensure(resolve(Purpose::Logs)?)
}

fn resolve(purpose: Purpose) -> Result<PathBuf, AppDirError> {
    let home = test_home().or_else(|| {
        std::env::var_os(CONFIG_HOME_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    });
    if let Some(home) = home {
        let app = home.join(APP_DIR_NAME);
        return Ok(match purpose {
            Purpose::Config => app,
            Purpose::Logs => app.join("logs"),
        });
    }
    let dirs = ProjectDirs::from("", "", APP_DIR_NAME).ok_or(AppDirError::NoHome)?;
    Ok(match purpose {
        Purpose::Config => dirs.config_dir().to_path_buf(),
        Purpose::Logs => dirs.data_local_dir().join("logs"),
    })
}

fn ensure(path: PathBuf) -> Result<PathBuf, AppDirError> {
    std::fs::create_dir_all(&path).map_err(|source| AppDirError::CreateDir {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

#[cfg(test)]
thread_local! {
    static TEST_HOME: std::cell::RefCell<Option<PathBuf>> = const { std::cell::RefCell::new(None) };
}

#[cfg(test)]
fn test_home() -> Option<PathBuf> {
    TEST_HOME.with(|home| home.borrow().clone())
}

#[cfg(not(test))]
fn test_home() -> Option<PathBuf> {
    None
}

/// Redirects this thread's app directories into `path` until dropped.
#[cfg(test)]
pub(crate) struct TestHome;

#[cfg(test)]
impl TestHome {
    pub(crate) fn set(path: PathBuf) -> Self {
        TEST_HOME.with(|home| *home.borrow_mut() = Some(path));
        TestHome
    }
}

#[cfg(test)]
impl Drop for TestHome {
    fn drop(&mut self) {
        TEST_HOME.with(|home| *home.borrow_mut() = None);
    }
}
