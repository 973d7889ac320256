//! chainsift - chain metadata ingestion and transformer dispatch
//!
//! This binary provides:
//! - Header back-fill and head validation against a chain node
//! - Log extraction for registered event transformers
//! - Storage diff ingestion from a tailed CSV file or a node subscription
//!
//! Transformer sets are registered at startup in [`run_pipeline`]; the stock
//! binary registers none and runs as a chain-metadata syncer.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use chainsift_indexer::chain::{ChainGateway, RpcGateway};
use chainsift_indexer::config::{Config, DiffSource, StorageDiffsConfig};
use chainsift_indexer::extract::LogExtractorBuilder;
use chainsift_indexer::storage::Storage;
use chainsift_indexer::storage_diffs::{
    CsvTailFetcher, StorageDiffExtractor, StorageDiffFetcher, SubscriptionFetcher,
};
use chainsift_indexer::transform::{Dispatcher, Transformer};
use chainsift_indexer::watcher::Watcher;

#[derive(Parser)]
#[command(name = "chainsift")]
#[command(version, about = "Chain metadata ingestion and transformer dispatch", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "chainsift.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the pipeline (header sync + log extraction + diff ingestion)
    Run(RunArgs),

    /// Show database statistics
    Status,

    /// Initialize the database
    InitDb {
        /// Database URL
        #[arg(long, default_value = "sqlite://chainsift.db")]
        database_url: String,
    },
}

#[derive(clap::Args, Default)]
struct RunArgs {
    /// Override the starting block number
    #[arg(long)]
    starting_block: Option<i64>,

    /// Re-examine already-checked headers up to the recheck cap
    #[arg(long)]
    recheck_headers: bool,

    /// Override the unexpected-error budget
    #[arg(long)]
    max_unexpected_errors: Option<i64>,

    /// Override the retry interval between rounds, in seconds
    #[arg(long)]
    retry_interval_secs: Option<u64>,

    /// Override the storage diff source
    #[arg(long, value_enum)]
    storage_diffs_source: Option<DiffSourceArg>,

    /// Override the storage diff CSV path
    #[arg(long)]
    storage_diffs_path: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum DiffSourceArg {
    Csv,
    Stream,
}

impl From<DiffSourceArg> for DiffSource {
    fn from(arg: DiffSourceArg) -> Self {
        match arg {
            DiffSourceArg::Csv => DiffSource::Csv,
            DiffSourceArg::Stream => DiffSource::Stream,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug)?;

    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => run_pipeline(&cli.config, args).await?,
        Commands::Status => show_status(&cli.config).await?,
        Commands::InitDb { database_url } => init_database(&database_url).await?,
    }

    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_logging(debug: bool) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = if debug {
        EnvFilter::new("chainsift_indexer=debug,sqlx=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("chainsift_indexer=info"))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();

    Ok(())
}

fn apply_overrides(config: &mut Config, args: &RunArgs) -> Result<()> {
    if let Some(starting_block) = args.starting_block {
        config.sync.starting_block = starting_block;
    }
    if args.recheck_headers {
        config.sync.recheck_headers = true;
    }
    if let Some(cap) = args.max_unexpected_errors {
        config.sync.max_unexpected_errors = cap;
    }
    if let Some(secs) = args.retry_interval_secs {
        config.sync.polling_interval_secs = secs;
    }
    if let Some(source) = args.storage_diffs_source {
        let path = args
            .storage_diffs_path
            .clone()
            .or_else(|| config.storage_diffs.as_ref().and_then(|d| d.path.clone()));
        config.storage_diffs = Some(StorageDiffsConfig::new(source.into(), path));
    } else if let Some(path) = &args.storage_diffs_path {
        match &mut config.storage_diffs {
            Some(diffs) => diffs.path = Some(path.clone()),
            None => {
                config.storage_diffs =
                    Some(StorageDiffsConfig::new(DiffSource::Csv, Some(path.clone())));
            }
        }
    }
    config.validate()
}

/// The transformer registration point.
///
/// Deployments link their domain transformers here; the set is frozen once
/// handed to the dispatcher. The stock binary registers none and runs as a
/// pure chain-metadata syncer.
fn registered_transformers(_storage: &Storage) -> Vec<Transformer> {
    Vec::new()
}

async fn run_pipeline(config_path: &str, args: RunArgs) -> Result<()> {
    let mut config = Config::from_file(config_path)?;
    apply_overrides(&mut config, &args)?;

    info!("chainsift starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let storage = Storage::new(
        &config.database.url,
        Some(config.database.max_connections),
        Some(config.database.min_connections),
    )
    .await?;
    storage.run_migrations().await?;

    let gateway: Arc<dyn ChainGateway> = Arc::new(RpcGateway::new(&config.node.rpc_url)?);
    let node = gateway.node_info().await.context("Failed to query node identity")?;
    info!(
        fingerprint = %node.fingerprint,
        network_id = node.network_id,
        client = %node.client_version,
        "connected to node"
    );

    let (dispatcher, storage_transformers) =
        Dispatcher::register(registered_transformers(&storage));

    let log_extractor = if dispatcher.has_event_transformers() {
        let mut builder = LogExtractorBuilder::new();
        for (id, event_config) in dispatcher.event_configs() {
            builder.add_config(id.clone(), event_config);
        }
        Some(builder.build(gateway.clone(), storage.clone(), node.fingerprint.clone()))
    } else {
        None
    };

    let cancel = CancellationToken::new();
    let mut diff_rx = None;
    let mut drain_limit = 500;
    let mut fetcher_task = None;

    if let Some(diffs_config) = &config.storage_diffs {
        drain_limit = diffs_config.drain_limit;
        let (diff_tx, rx) = mpsc::channel(diffs_config.channel_capacity);
        diff_rx = Some(rx);

        let fetcher: Box<dyn StorageDiffFetcher> = match diffs_config.source {
            DiffSource::Csv => {
                let path = diffs_config
                    .path
                    .clone()
                    .context("storage_diffs.path is required for the csv source")?;
                Box::new(CsvTailFetcher::new(path))
            }
            DiffSource::Stream => Box::new(SubscriptionFetcher::new(gateway.clone())),
        };

        let fetch_cancel = cancel.clone();
        fetcher_task = Some(tokio::spawn(async move {
            if let Err(e) = fetcher.run(diff_tx, fetch_cancel).await {
                error!(component = "diff_fetcher", error = %e, "storage diff source failed");
            }
        }));
    }

    let watcher = Watcher::new(
        gateway,
        storage.clone(),
        node.fingerprint,
        dispatcher,
        log_extractor,
        StorageDiffExtractor::new(storage.clone(), storage_transformers),
        diff_rx,
        config.sync.watcher_settings(drain_limit),
    );

    let mut watcher_task = tokio::spawn(watcher.run(cancel.clone()));
    let run_result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!("Received shutdown signal, gracefully shutting down...");
            cancel.cancel();
            watcher_task.await?
        }
        result = &mut watcher_task => {
            cancel.cancel();
            result?
        }
    };

    if let Some(task) = fetcher_task {
        let _ = task.await;
    }
    storage.close().await;

    run_result.map_err(Into::into)
}

async fn show_status(config_path: &str) -> Result<()> {
    let config = Config::from_file(config_path)?;
    let storage = Storage::new(&config.database.url, None, None)
        .await
        .context("Failed to connect to database")?;
    storage.run_migrations().await?;

    let stats = storage.stats().await?;

    println!("\n=== chainsift status ===\n");
    println!("  Headers:       {}", stats.header_count);
    println!("  Transactions:  {}", stats.transaction_count);
    println!("  Logs:          {}", stats.log_count);
    println!("  Storage diffs: {}", stats.diff_count);
    println!();

    storage.close().await;
    Ok(())
}

async fn init_database(database_url: &str) -> Result<()> {
    info!("Initializing database: {}", database_url);

    let storage = Storage::new(database_url, None, None)
        .await
        .context("Failed to connect to database")?;
    storage.run_migrations().await?;
    storage
        .health_check()
        .await
        .context("Database health check failed")?;

    info!("Database initialized successfully");
    storage.close().await;
    Ok(())
}
