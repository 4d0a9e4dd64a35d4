//! Attendance monitor CLI library.
//!
//! This crate provides the `attend` command line interface and the presence
//! monitor loop it runs.

mod cli;
pub mod commands;
mod config;
pub mod logging;
pub mod monitor;

pub use cli::{Cli, Commands};
pub use config::Config;
