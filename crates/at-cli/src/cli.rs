//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// Router-based attendance monitor.
///
/// Polls the gateway for connected devices, maps them to whitelisted users,
/// and keeps a per-user history of presence intervals.
#[derive(Debug, Parser)]
#[command(name = "attend", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Poll the gateway and record presence until interrupted.
    Run,

    /// Show each user's most recent presence interval.
    Status,

    /// Show presence intervals for one day.
    Report {
        /// Day to report (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List whitelisted users and their devices.
    Users,
}
