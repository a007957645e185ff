//! Entry point for the `filetrack` command-line tool.

mod cli;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use time::OffsetDateTime;

use cli::{Cli, Commands, ConfigCommand};
use filetrack::config::{self, TrackerConfig};
use filetrack::logging;
use filetrack::tracking::{RootId, ScanOptions, ScanResult, ScanStatus, StateStore, scan_configured};

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => config::config_path()?,
    };
    let existing = config::load_from(&config_path).ok();
    if let Err(err) = logging::init(existing.as_ref().map(|config| config.log_folder.as_path())) {
        eprintln!("Logging disabled: {err}");
    }

    match cli.command {
        Commands::Scan { parallel, roots } => {
            let config = config::load_from(&config_path)?;
            let options = ScanOptions {
                parallel_walk: parallel,
                ..ScanOptions::default()
            };
            let result = scan_configured(&config, &roots, &options)?;
            print_report(&result);
            Ok(exit_code(result.overall_status))
        }
        Commands::Dump { root } => {
            let config = config::load_from(&config_path)?;
            dump(&config, root.map(RootId::from_string))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config(command) => {
            run_config_command(&config_path, command)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_config_command(path: &Path, command: ConfigCommand) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        ConfigCommand::Init {
            database,
            log_folder,
        } => {
            config::init(path, &database, &log_folder)?;
            println!("Created {}", path.display());
        }
        ConfigCommand::ImportLegacy { json } => {
            if path.exists() {
                return Err(config::ConfigError::AlreadyExists {
                    path: path.to_path_buf(),
                }
                .into());
            }
            let imported = config::import_legacy(&json)?;
            config::save_to_path(&imported, path)?;
            println!(
                "Imported {} roots from {} into {}",
                imported.roots.len(),
                json.display(),
                path.display()
            );
        }
        ConfigCommand::Show => {
            let config = config::load_from(path)?;
            println!("# {}", path.display());
            print!("{}", toml::to_string_pretty(&config)?);
        }
        edit => {
            let mut config = config::load_from(path)?;
            apply_edit(&mut config, edit)?;
            config::save_to_path(&config, path)?;
        }
    }
    Ok(())
}

fn apply_edit(config: &mut TrackerConfig, edit: ConfigCommand) -> Result<(), config::ConfigError> {
    match edit {
        ConfigCommand::AddRoot { path, id } => match config.add_root(&path, id)? {
            Some(id) => println!("Registered {} as {id}", path.display()),
            None => println!("{} is already registered", path.display()),
        },
        ConfigCommand::RemoveRoot { root } => {
            if config.remove_root(&root) {
                println!("Removed {root}");
            } else {
                println!("{root} wasn't found in the config");
            }
        }
        ConfigCommand::SetDatabase { path } => {
            config.set_database(&path)?;
            println!("Database set to {}", config.database.display());
        }
        ConfigCommand::SetLogFolder { path } => {
            config.set_log_folder(&path)?;
            println!("Log folder set to {}", config.log_folder.display());
        }
        ConfigCommand::Init { .. } | ConfigCommand::Show | ConfigCommand::ImportLegacy { .. } => {}
    }
    Ok(())
}

fn print_report(result: &ScanResult) {
    println!(
        "{:<24} {:<16} {:>8} {:>8} {:>8} {:>8}",
        "root", "status", "added", "removed", "modified", "skipped"
    );
    for report in result.per_root.values() {
        println!(
            "{:<24} {:<16} {:>8} {:>8} {:>8} {:>8}",
            report.root_id.as_str(),
            report.status.as_str(),
            report.counts.added,
            report.counts.removed,
            report.counts.modified,
            report.skipped_count
        );
        if let Some(failure) = &report.failure {
            println!("  {failure}");
        }
        if let Some(warning) = &report.log_warning {
            println!("  history not written: {warning}");
        }
    }
    println!("overall: {}", result.overall_status);
}

fn exit_code(status: ScanStatus) -> ExitCode {
    match status {
        ScanStatus::Success => ExitCode::SUCCESS,
        ScanStatus::PartialFailure => ExitCode::from(2),
        ScanStatus::Failure => ExitCode::FAILURE,
    }
}

fn dump(config: &TrackerConfig, root: Option<RootId>) -> Result<(), Box<dyn std::error::Error>> {
    let store = StateStore::open_read_only(&config.database)?;
    for summary in store.list_roots()? {
        if root.as_ref().is_some_and(|wanted| *wanted != summary.root_id) {
            continue;
        }
        let last_scan = summary
            .last_scan_completed_at
            .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
            .map_or_else(|| "never".to_string(), |at| at.to_string());
        println!(
            "== {} ({} entries, last scan {last_scan})",
            summary.root_id, summary.file_count
        );
        println!("{:<80} | {:<9} | {:>12} | {:>20}", "Path", "Kind", "Size", "Modified (ns)");
        for record in store.load_all(Some(&summary.root_id))?.values() {
            println!(
                "{:<80} | {:<9} | {:>12} | {:>20}",
                record.path,
                record.kind.as_str(),
                record.size,
                record.modified_ns
            );
        }
    }
    Ok(())
}
