//! Admin command implementation.

use crate::cli::Cli;
use crate::core::config::{Config, ConfigOverrides};
use crate::grace::{GraceDb, GraceDump};
use crate::store::MemoryStore;
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;

/// Initialize tracing subscriber if the telemetry feature is enabled.
#[cfg(feature = "telemetry")]
fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

#[cfg(not(feature = "telemetry"))]
fn init_tracing(_level: &str) {}

/// Run the admin tool.
pub fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(Path::new(path))?,
        None => Config::default(),
    };
    config.apply_overrides(&ConfigOverrides {
        log_level: cli.log_level.clone(),
        nodeid: None,
    });
    init_tracing(&config.telemetry.log_level);

    validate_nodeids(&cli.nodeids)?;
    let nodeids: Vec<&str> = cli.nodeids.iter().map(String::as_str).collect();

    let store = connect(&config)?;
    let grace = GraceDb::new(&store, config.store.object.clone())
        .with_max_entries(config.grace.max_entries)
        .with_notify_timeout(Duration::from_millis(config.grace.notify_timeout_ms))
        .with_conflict_backoff(Duration::from_millis(config.grace.conflict_backoff_ms));

    if grace.create().context("can't create grace database")? {
        tracing::info!(oid = %grace.oid(), "created grace database");
    }

    // No nodeids means don't change anything.
    if !nodeids.is_empty() {
        if cli.lift {
            grace.lift(&nodeids).context("can't lift grace period")?;
        } else {
            grace.start(&nodeids).context("can't start grace period")?;
        }
    }

    let dump = grace.dump().context("can't dump grace database")?;
    print_dump(&dump);
    Ok(())
}

/// Nodeids on the command line are decimal integers below `u32::MAX`.
fn validate_nodeids(nodeids: &[String]) -> Result<()> {
    for raw in nodeids {
        let value: u64 = raw
            .parse()
            .map_err(|_| anyhow::anyhow!("bad nodeid: {raw}"))?;
        if value >= u64::from(u32::MAX) {
            anyhow::bail!("bad nodeid: {raw}");
        }
    }
    Ok(())
}

fn connect(config: &Config) -> Result<MemoryStore> {
    // The reference backend lives in-process; real object stores attach
    // through the ObjectStore trait out of tree.
    tracing::debug!(
        pool = %config.store.pool,
        namespace = config.store.namespace.as_deref().unwrap_or(""),
        "connecting to object store"
    );
    Ok(MemoryStore::new())
}

fn print_dump(dump: &GraceDump) {
    println!("{}", dump.epochs);
    for (nodeid, flags) in &dump.nodes {
        println!("{nodeid} {flags}");
    }
}
