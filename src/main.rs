use cardroute::config::{Adapters, GatewayConfig};
use cardroute::domain::ports::{SharedPaymentStore, SharedRiskSignals, SharedTokenStore};
use cardroute::infrastructure::codec::MaskingPanCodec;
use cardroute::infrastructure::emulator::{
    EmulatedCardProcessor, DEFAULT_DECLINE_RATE, DEFAULT_FAILURE_RATE,
};
use cardroute::infrastructure::in_memory::{InMemoryPaymentStore, InMemoryTokenStore};
#[cfg(feature = "storage-rocksdb")]
use cardroute::infrastructure::rocksdb::RocksDbStore;
use cardroute::infrastructure::signals::{NoRiskSignals, SampledRiskSignals};
use cardroute::interfaces::batch::BatchRunner;
use cardroute::interfaces::csv::command_reader::CommandReader;
use cardroute::interfaces::csv::payment_writer::PaymentWriter;
use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SignalMode {
    /// No device or IP signals; only the country check applies
    Off,
    /// Flag transactions at the reference base rates
    Sampled,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Batch commands CSV file
    input: PathBuf,

    /// JSON file overriding BIN ranges, token ranges, fees and tunables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Seed for every random source, for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Probability that the emulated issuer declines an authorization
    #[arg(long, default_value_t = DEFAULT_DECLINE_RATE)]
    decline_rate: f64,

    /// Probability of an emulated network failure on any processor call
    #[arg(long, default_value_t = DEFAULT_FAILURE_RATE)]
    failure_rate: f64,

    #[arg(long, value_enum, default_value_t = SignalMode::Off)]
    risk_signals: SignalMode,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => GatewayConfig::from_json_file(path).into_diagnostic()?,
        None => GatewayConfig::default(),
    };

    let (payments, tokens) = open_stores(cli.db_path.as_deref())?;

    let processor = EmulatedCardProcessor::new(cli.failure_rate, cli.decline_rate).into_diagnostic()?;
    let (processor, codec) = match cli.seed {
        Some(seed) => (processor.with_seed(seed), MaskingPanCodec::with_seed(seed)),
        None => (processor, MaskingPanCodec::new()),
    };
    let signals: SharedRiskSignals = match (cli.risk_signals, cli.seed) {
        (SignalMode::Off, _) => Arc::new(NoRiskSignals),
        (SignalMode::Sampled, Some(seed)) => Arc::new(SampledRiskSignals::with_seed(seed)),
        (SignalMode::Sampled, None) => Arc::new(SampledRiskSignals::new()),
    };

    let adapters = Adapters {
        payments,
        tokens,
        processor: Arc::new(processor),
        signals,
        codec: Arc::new(codec),
    };
    let orchestrator = config.orchestrator(adapters, cli.seed).into_diagnostic()?;
    let mut runner = BatchRunner::new(Arc::new(orchestrator));
    let resumed = runner.resume().await.into_diagnostic()?;
    if resumed > 0 {
        info!(payments = resumed, "resumed from persistent store");
    }

    // Process commands
    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for (row, command) in reader.commands().enumerate() {
        match command {
            Ok(command) => {
                if let Err(e) = runner.apply(command).await {
                    eprintln!("Error processing row {}: {}", row + 1, e);
                }
            }
            Err(e) => {
                eprintln!("Error reading row {}: {}", row + 1, e);
            }
        }
    }

    // Output final payment table
    let payments = runner.orchestrator().all_payments().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = PaymentWriter::new(stdout.lock());
    writer.write_payments(&payments).into_diagnostic()?;

    Ok(())
}

fn in_memory_stores() -> (SharedPaymentStore, SharedTokenStore) {
    (
        Arc::new(InMemoryPaymentStore::new()),
        Arc::new(InMemoryTokenStore::new()),
    )
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<&Path>) -> Result<(SharedPaymentStore, SharedTokenStore)> {
    match db_path {
        Some(path) => {
            let store = RocksDbStore::open(path).into_diagnostic()?;
            Ok((Arc::new(store.clone()), Arc::new(store)))
        }
        None => Ok(in_memory_stores()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<&Path>) -> Result<(SharedPaymentStore, SharedTokenStore)> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_stores())
}
