//! shiftdb Command-Line Client
//!
//! Applies a folder of versioned changesets to a sled database and inspects
//! the recorded history.

mod config;
mod error;
mod formatter;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use shiftdb_core::checksum::checksum_path;
use shiftdb_core::{Migrator, SledChangeLogStore, SledTarget};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use config::GlobalArgs;
use error::CliError;
use formatter::{create_formatter, OutputFormat};

/// shiftdb migration tool
#[derive(Parser, Debug)]
#[command(name = "shiftdb")]
#[command(version, about = "Versioned changeset migrations for sled databases")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply every pending changeset in a folder
    Migrate {
        /// Folder holding the changesets
        folder: PathBuf,

        /// Output format
        #[arg(long, default_value = "table", value_enum)]
        format: OutputFormat,
    },

    /// Show what a migration would do, without changing anything
    Plan {
        /// Folder holding the changesets
        folder: PathBuf,

        /// Output format
        #[arg(long, default_value = "table", value_enum)]
        format: OutputFormat,
    },

    /// List recorded changelogs in execution order
    History {
        /// Output format
        #[arg(long, default_value = "table", value_enum)]
        format: OutputFormat,
    },

    /// Print the checksum of a file or directory
    Checksum {
        /// File or directory to fingerprint
        path: PathBuf,

        /// Directory member extensions to include
        #[arg(long = "ext", default_value = "json")]
        extensions: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let directive = if cli.global.verbose {
        "shiftdb=debug"
    } else {
        "shiftdb=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Migrate { folder, format } => migrate(cli.global, &folder, format),
        Command::Plan { folder, format } => {
            let migrator = open(cli.global)?;
            let plan = migrator.plan(&folder)?;
            println!("{}", create_formatter(format).format_plan(&plan)?);
            Ok(())
        }
        Command::History { format } => {
            let migrator = open(cli.global)?;
            let history = migrator.history()?;
            println!("{}", create_formatter(format).format_history(&history)?);
            Ok(())
        }
        Command::Checksum { path, extensions } => {
            let extensions: Vec<&str> = extensions.iter().map(String::as_str).collect();
            println!("{}", checksum_path(&path, &extensions)?);
            Ok(())
        }
    }
}

/// Run a migration, printing the outcomes even when it aborts.
fn migrate(global: GlobalArgs, folder: &Path, format: OutputFormat) -> Result<(), CliError> {
    let migrator = open(global)?;
    let reconciliation = migrator.run(folder)?;

    println!(
        "{}",
        create_formatter(format).format_outcomes(&reconciliation.outcomes)?
    );
    reconciliation.into_result()?;
    Ok(())
}

fn open(global: GlobalArgs) -> Result<Migrator<SledChangeLogStore, SledTarget>, CliError> {
    let config = global.into_config();
    debug!(
        data_path = %config.data_path.display(),
        runner = %config.runner,
        collection = %config.target.document_collection,
        "opening database"
    );
    Ok(Migrator::open(&config)?)
}
