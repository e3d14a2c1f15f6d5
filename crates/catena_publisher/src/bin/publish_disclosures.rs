//! # publish_disclosures
//!
//! Publishes every entry of a JSON disclosure file to the ledger through a
//! local node's IPC socket, writing progress back into the file.
//!
//! ```bash
//! publish_disclosures -f disclosures.json -c 10 --config catena.toml
//!
//! # Resume after a crash: entries already sent are waited on, not resent
//! publish_disclosures -f disclosures.json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use alloy_primitives::Address;
use catena_core::{CatenaClient, CatenaConfig, CatenaError, IpcConfig, IpcProvider};
use catena_publisher::{
    BatchPublisher, BatchSummary, DisclosureStore, PublisherConfig, PublisherResult,
    DEFAULT_MAX_UNCONFIRMED,
};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "publish_disclosures")]
#[command(about = "Publish a file of disclosures to the ledger")]
#[command(version)]
struct Args {
    /// Path to the JSON entries file (updated in place)
    #[arg(short = 'f', long)]
    file: PathBuf,

    /// Maximum number of sent but unconfirmed transactions
    #[arg(short = 'c', long, default_value_t = DEFAULT_MAX_UNCONFIRMED)]
    max_unconfirmed: usize,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Node IPC socket, overrides the config file
    #[arg(long)]
    ipc_path: Option<String>,

    /// Ledger contract address, overrides the config file
    #[arg(long)]
    disclosure_manager: Option<Address>,

    /// Gas price in wei, overrides the config file
    #[arg(long)]
    gas_price: Option<u64>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_tracing(log_level: &str) {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with_target(false)
        .init();
}

fn load_config(args: &Args) -> PublisherResult<CatenaConfig> {
    let mut config = match &args.config {
        Some(path) => CatenaConfig::from_file(path)?,
        None => CatenaConfig::default(),
    };
    if let Some(path) = &args.ipc_path {
        config = config.with_ipc_path(path.clone());
    }
    if let Some(address) = args.disclosure_manager {
        config = config.with_disclosure_manager(address);
    }
    if let Some(gas_price) = args.gas_price {
        config = config.with_gas_price(gas_price);
    }
    config.validate()?;
    Ok(config)
}

/// Everything that must succeed before the first transaction is sent.
async fn setup(args: &Args) -> PublisherResult<BatchPublisher<IpcProvider>> {
    let config = load_config(args)?;

    let ipc_config = IpcConfig::from(&config.provider);
    tracing::info!("Connecting to {}", ipc_config.socket_path);
    let provider = Arc::new(IpcProvider::new(ipc_config));
    let latency = provider.test_connection().await.map_err(CatenaError::from)?;
    tracing::debug!(?latency, "node reachable");

    let client = CatenaClient::from_config(provider, config)?;
    let store = Arc::new(DisclosureStore::open(&args.file)?);
    let backup = store.backup()?;
    tracing::info!("Input file backed up: {}", backup.display());

    Ok(BatchPublisher::new(
        client,
        store,
        PublisherConfig::default().with_max_unconfirmed(args.max_unconfirmed),
    ))
}

async fn run(args: Args) -> ExitCode {
    let publisher = match setup(&args).await {
        Ok(publisher) => publisher,
        Err(err) => {
            tracing::error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    match publisher.run().await {
        Ok(BatchSummary {
            total,
            newly_confirmed,
            previously_confirmed,
            failed,
            ..
        }) => {
            tracing::info!(
                "Published {newly_confirmed} disclosures ({previously_confirmed} already published, {failed} failed) of {total}"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let failed = err.use_stderr();
            let _ = err.print();
            return if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };
    init_tracing(&args.log_level);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!("failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };
    runtime.block_on(run(args))
}
