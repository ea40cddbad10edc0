//! CLI interface for confluence
//!
//! Provides subcommands for:
//! - `config`: Print the effective configuration
//! - `validate`: Check a configuration file
//! - `levels`: Stop, target and size for a hypothetical entry
//! - `journal`: Summarise a Parquet trade journal

mod journal;
mod levels;

pub use journal::JournalArgs;
pub use levels::{Levels, LevelsArgs};

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "confluence")]
#[command(about = "Composite decision and risk control engine")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the effective configuration
    Config,
    /// Validate the configuration file
    Validate,
    /// Compute stop, target and quantity for an entry
    Levels(LevelsArgs),
    /// Summarise recorded trades
    Journal(JournalArgs),
}
