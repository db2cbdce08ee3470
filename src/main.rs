use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use container_backup::managers::logging::{init_console_logging, init_logging, LoggingConfig};
use container_backup::{load_config, BackupError, BackupManager};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "container-backup")]
#[command(about = "Backup and restore of container volumes and host directories", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/container-backup/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up a definition and upload the archive
    Backup {
        /// Backup definition name
        name: String,

        /// Give up (and restart any stopped container) after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Download an archive and unpack it back into place
    Restore {
        /// Backup definition name
        name: String,

        /// Version to restore (defaults to the latest)
        #[arg(long)]
        version: Option<String>,

        /// Give up (and restart any stopped container) after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Validate the configuration and required programs
    Validate,

    /// List configured backup definitions
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            init_console_logging();
            return Err(e).with_context(|| format!("Cannot load configuration {:?}", cli.config));
        }
    };

    // Only long-running commands log to file
    let _log_guard = match cli.command {
        Commands::Backup { .. } | Commands::Restore { .. } => {
            Some(init_logging(&LoggingConfig::from_global(&config.global))?)
        }
        Commands::Validate | Commands::List => {
            init_console_logging();
            None
        }
    };

    let manager = BackupManager::new(config)?;

    match cli.command {
        Commands::Backup { name, timeout } => {
            println!("Running backup: {}", name);
            let report = manager
                .backup(&name, timeout.map(Duration::from_secs))
                .map_err(report_origin_down)?;
            println!(
                "✓ Backup completed: version {} ({:.2}s)",
                report.version,
                report.duration.as_secs_f64()
            );
        }

        Commands::Restore {
            name,
            version,
            timeout,
        } => {
            println!("Restoring: {}", name);
            let report = manager
                .restore(&name, version.as_deref(), timeout.map(Duration::from_secs))
                .map_err(report_origin_down)?;
            println!(
                "✓ Restore of version {} completed ({:.2}s)",
                report.version,
                report.duration.as_secs_f64()
            );
        }

        Commands::Validate => {
            let missing = manager.missing_binaries();
            if !missing.is_empty() {
                anyhow::bail!("Required programs not found in PATH: {}", missing.join(", "));
            }
            println!("Configuration is valid!");
            println!("Backups: {}", manager.definitions().names().len());
        }

        Commands::List => {
            println!("Configured backups:");
            for definition in manager.definitions().iter() {
                println!("  {}", definition.name);
                println!("    Type: {}", definition.kind);
                if let Some(target) = definition.container() {
                    println!("    Container: {} (via {})", target.name, target.engine);
                }
                println!("    Paths: {}", definition.source.paths.join(", "));
                println!("    Collection: {}", definition.collection_id);
                println!(
                    "    Encrypted: {}",
                    if definition.encryption.is_some() { "yes" } else { "no" }
                );
                println!();
            }
        }
    }

    Ok(())
}

/// Make a container left stopped impossible to miss
fn report_origin_down(err: BackupError) -> BackupError {
    if let BackupError::OriginRestart {
        ref container,
        ref previous,
        ..
    } = err
    {
        eprintln!("⚠️  Container '{}' is NOT running, start it manually!", container);
        if let Some(previous) = previous {
            eprintln!("   The operation had already failed: {}", previous);
        }
    }
    err
}
