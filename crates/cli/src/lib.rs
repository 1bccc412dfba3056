use addrscope_core::{
    AddressRange, ByteWindowCache, CacheConfig, DataSource, LoadOutcome, Record, RecordWindowCache,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub mod source;

pub use source::FileSource;

#[derive(Debug, Parser)]
#[command(name = "addrscope")]
#[command(about = "Browse large address spaces through the chunked caches")]
pub struct Cli {
    /// JSON cache configuration; environment variables are used otherwise.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print raw byte rows around an address.
    Bytes {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_parser = parse_address)]
        address: u64,
        #[arg(long, default_value_t = 4)]
        rows: u32,
        /// Address of the first byte of the file.
        #[arg(long, value_parser = parse_address, default_value = "0")]
        base: u64,
    },
    /// Print fixed-width records starting at an address.
    Records {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_parser = parse_address)]
        address: u64,
        #[arg(long, default_value_t = 8)]
        count: u32,
        #[arg(long, default_value_t = 4)]
        record_size: u32,
        #[arg(long, value_parser = parse_address, default_value = "0")]
        base: u64,
    },
    /// Print the effective cache configuration.
    Config,
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct RowOutput {
    address: u64,
    hex: String,
}

#[derive(Debug, Serialize)]
struct BytesOutput {
    range: AddressRange,
    rows: Vec<RowOutput>,
}

#[derive(Debug, Serialize)]
struct RecordsOutput {
    range: AddressRange,
    estimated_total: u64,
    records: Vec<Record>,
}

fn parse_address(text: &str) -> Result<u64, String> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|error| format!("invalid address `{text}`: {error}"))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // Already initialised when run more than once in-process
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Bytes { file, address, rows, base } => {
            block_on(run_bytes(&file, address, rows, base, config))
        }
        Commands::Records { file, address, count, record_size, base } => {
            let records_per_chunk = config.records_per_chunk;
            let config = config.with_record_layout(records_per_chunk, record_size);
            block_on(run_records(&file, address, count, base, config))
        }
        Commands::Config => print_json(&config),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<CacheConfig> {
    match path {
        Some(path) => CacheConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => CacheConfig::from_env().context("invalid cache configuration in environment"),
    }
}

fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?
        .block_on(future)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to encode JSON output")?;
    println!("{json}");
    Ok(())
}

fn open_source(file: &Path, base: u64, record_size: u32) -> Result<(AddressRange, Arc<dyn DataSource>)> {
    let source = FileSource::open(file, base, record_size)
        .with_context(|| format!("failed to open {}", file.display()))?;
    if source.is_empty() {
        bail!("{} is empty", file.display());
    }
    let range = AddressRange::with_len(base, source.len());
    let source: Arc<dyn DataSource> = Arc::new(source);
    Ok((range, source))
}

async fn run_bytes(file: &Path, address: u64, rows: u32, base: u64, config: CacheConfig) -> Result<()> {
    let (range, source) = open_source(file, base, 1)?;
    if !range.contains(address) {
        bail!("address {address:#x} is outside {range}");
    }

    let cache = ByteWindowCache::new(range, config, source);
    let first = cache.index_for_address(address);
    let mut output = Vec::new();

    for index in (first..cache.row_count()).take(rows as usize) {
        let row_address = cache.address_for_index(index);
        if cache.row_at_address(row_address).is_none() {
            cache
                .load_chunk_around_address(row_address)
                .await
                .with_context(|| format!("failed to load bytes at {row_address:#x}"))?;
        }
        if let Some(row) = cache.row_at_address(row_address) {
            output.push(RowOutput {
                address: row.address,
                hex: hex::encode(&row.bytes),
            });
        }
    }

    tracing::debug!(stats = ?cache.stats(), "byte cache after read");
    print_json(&BytesOutput { range, rows: output })
}

async fn run_records(file: &Path, address: u64, count: u32, base: u64, config: CacheConfig) -> Result<()> {
    let (range, source) = open_source(file, base, config.avg_record_size)?;
    if !range.contains(address) {
        bail!("address {address:#x} is outside {range}");
    }

    let cache = RecordWindowCache::new(range, config, source);
    cache
        .reset_and_load_around(address)
        .await
        .with_context(|| format!("failed to load records at {address:#x}"))?;

    let first = cache.closest_index(address).unwrap_or(0);
    let wanted = first + count as usize;
    while cache.loaded_count() < wanted {
        match cache.load_more(true).await.context("failed to load more records")? {
            LoadOutcome::Loaded => {}
            _ => break,
        }
    }

    let records = cache.records().into_iter().skip(first).take(count as usize).collect();
    print_json(&RecordsOutput {
        range,
        estimated_total: cache.estimated_total_count(),
        records,
    })
}
