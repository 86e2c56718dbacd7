//! Command-line interface.
//!
//! The admin tool drives the grace database directly: with no nodeids it
//! ensures the object exists and dumps it; with nodeids it starts (or, with
//! `-l`, lifts) a grace period on their behalf and then dumps.

pub mod commands;

use clap::Parser;

/// Gracekeeper - coordinated grace-period database administration.
#[derive(Parser, Debug)]
#[command(name = "gracekeeper")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Lift the grace period for the listed nodeids instead of starting one.
    #[arg(short = 'l')]
    pub lift: bool,

    /// Nodeids to act on: decimal integers below 4294967295.
    pub nodeids: Vec<String>,

    /// Configuration file path.
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}
