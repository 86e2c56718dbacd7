//! Gracekeeper - admin tool entrypoint.
//!
//! Usage:
//!   gracekeeper                 ensure the grace database exists, dump it
//!   gracekeeper 1 2 3           start a grace period for nodes 1, 2, 3
//!   gracekeeper -l 1 2          lift the grace period for nodes 1 and 2

use anyhow::Result;
use clap::Parser;
use gracekeeper::cli::{commands, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    commands::run(cli)
}
