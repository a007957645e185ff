//! Command-line interface definitions for filetrack.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Main CLI structure.
#[derive(Parser)]
#[command(
    name = "filetrack",
    version,
    about = "Track file metadata under registered roots and log every change"
)]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(short, long, global = true, env = "FILETRACK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan registered roots, commit their new state and log the changes
    Scan {
        /// Walk roots concurrently
        #[arg(long)]
        parallel: bool,

        /// Only scan these roots (repeatable)
        #[arg(long = "root", value_name = "ID")]
        roots: Vec<String>,
    },

    /// Print tracked records as a table
    Dump {
        /// Only show this root
        #[arg(long = "root", value_name = "ID")]
        root: Option<String>,
    },

    /// Create or edit the configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Create a new config file
    Init {
        /// State store location; created when missing
        #[arg(long)]
        database: PathBuf,

        /// Existing folder for the change history and run logs
        #[arg(long)]
        log_folder: PathBuf,
    },

    /// Register a directory for tracking
    AddRoot {
        path: PathBuf,

        /// Identifier for the root (defaults to the directory name)
        #[arg(long)]
        id: Option<String>,
    },

    /// Stop tracking a root
    RemoveRoot {
        /// Root id or path
        root: String,
    },

    /// Point at a different state store
    SetDatabase { path: PathBuf },

    /// Point at a different log folder
    SetLogFolder { path: PathBuf },

    /// Print the current configuration
    Show,

    /// Convert an older JSON config into the current format
    ImportLegacy {
        /// Legacy JSON config file
        json: PathBuf,
    },
}
