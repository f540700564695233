// ABOUTME: CLI entry point for db-replicate
// ABOUTME: Loads the JSON config, connects both databases and runs one catch-up pass

use anyhow::{bail, Context};
use clap::Parser;
use db_replicate::{config, database, sync, SyncOptions};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "db-replicate")]
#[command(
    about = "Copy rows missing from a lagging target database, using row counts to find the gap",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, env = "DB_REPLICATE_CONFIG", default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log: String,
    /// Override maxRowsToSyncFromOneTable for this run
    #[arg(long)]
    max_rows: Option<u64>,
    /// Read source rows ordered by primary key instead of natural order
    #[arg(long)]
    order_by_primary_key: bool,
    /// Compare row counts and report what would be copied, without copying
    #[arg(long)]
    dry_run: bool,
    /// Exit with an error if any row could not be inserted
    #[arg(long)]
    strict: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // 1. RUST_LOG environment variable has highest precedence
    // 2. --log flag is used if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = config::load(&cli.config)?;

    let mut options = SyncOptions::from_config(&config);
    if let Some(max_rows) = cli.max_rows {
        if max_rows == 0 {
            bail!("--max-rows must be at least 1");
        }
        options.max_rows = max_rows;
    }
    options.order_by_primary_key = cli.order_by_primary_key;
    options.dry_run = cli.dry_run;

    let mut source = database::connect(
        "source",
        &config.source,
        config.connect_timeout(),
        config.connect_retries,
    )
    .await?;
    let mut target = database::connect(
        "target",
        &config.target,
        config.connect_timeout(),
        config.connect_retries,
    )
    .await?;

    let summary = sync::run(source.as_mut(), target.as_mut(), &options)
        .await
        .context("Replication halted")?;

    summary.print();

    summary.ensure_no_dropped_rows(cli.strict)?;

    Ok(())
}
