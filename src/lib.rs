//! Library exports for the `filetrack` binary, benchmarks and tests.

/// Application directory resolution.
pub mod app_dirs;
/// Tracker configuration: roots, database and log locations.
pub mod config;
/// Logging setup for the binary.
pub mod logging;
/// Scan-and-reconcile engine.
pub mod tracking;
