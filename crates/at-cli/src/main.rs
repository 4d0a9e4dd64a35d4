use std::io;

use anyhow::{Context, Result};
use at_core::UserDirectory;
use clap::Parser;

use at_cli::commands::{report, run, status, users};
use at_cli::{Cli, Commands, Config, logging};

/// Open the database, ensuring the parent directory exists.
fn open_database(config: &Config) -> Result<at_db::Database> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    at_db::Database::open(&config.database_path).context("failed to open database")
}

fn load_directory(config: &Config) -> Result<UserDirectory> {
    UserDirectory::load(&config.whitelist_path).context("failed to load whitelist")
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(dir) = &config.log_dir {
        std::fs::create_dir_all(dir).context("failed to create log directory")?;
    }
    let _log_guard = logging::init(cli.verbose, config.log_dir.as_deref());
    tracing::debug!(?config, "loaded configuration");

    let mut stdout = io::stdout().lock();
    match &cli.command {
        Some(Commands::Run) => {
            let db = open_database(&config)?;
            let summary = run::run(db, &config)?;
            tracing::info!(
                ticks = summary.ticks,
                failed_ticks = summary.failed_ticks,
                "monitor stopped"
            );
        }
        Some(Commands::Status) => {
            let db = open_database(&config)?;
            status::run(&mut stdout, &db, &config.database_path)?;
        }
        Some(Commands::Report { date, json }) => {
            let db = open_database(&config)?;
            let directory = load_directory(&config)?;
            let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());
            report::run(&mut stdout, &db, &directory, date, *json)?;
        }
        Some(Commands::Users) => {
            let directory = load_directory(&config)?;
            users::run(&mut stdout, &directory)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
