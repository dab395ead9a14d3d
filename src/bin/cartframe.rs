//! Cartframe workload runner
//!
//! Powers a cartridge store on, replays a workload script against it, powers
//! it off and prints what was read along with the cache statistics.

use anyhow::{bail, Context};
use cartframe::{
    DeviceTransport, FrameStore, MemoryDevice, Report, StoreConfig, TcpTransport, Workload,
};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cartframe")]
#[command(about = "Replay a file workload against a cartridge frame store")]
struct Args {
    /// TOML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Bus server address (overrides the configuration)
    #[arg(short = 's', long)]
    server: Option<String>,

    /// Frame cache capacity (overrides the configuration)
    #[arg(long)]
    cache_frames: Option<usize>,

    /// Use an in-process device instead of the bus server
    #[arg(long)]
    memory: bool,

    /// Socket timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Workload script
    workload: PathBuf,
}

fn print_report(report: &Report) {
    for read in &report.reads {
        println!(
            "line {}: read {} of {} bytes from {}: {:?}",
            read.line, read.bytes, read.requested, read.name, read.text
        );
    }
    println!(
        "{} operations, {} bytes written, {} bytes read",
        report.operations, report.bytes_written, report.bytes_read
    );
    let cache = &report.cache;
    println!(
        "cache: {} hits, {} misses ({:.1}% hit rate), {} evictions, {} renumbers, {}/{} resident",
        cache.hits,
        cache.misses,
        cache.hit_rate(),
        cache.evictions,
        cache.renumbers,
        cache.resident,
        cache.capacity
    );
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::default(),
    };
    if let Some(server) = &args.server {
        config.server_address = server.clone();
    }
    if let Some(frames) = args.cache_frames {
        config.cache_frames = frames;
    }
    if args.memory && args.server.is_some() {
        bail!("--memory and --server cannot be used together");
    }

    let source = std::fs::read_to_string(&args.workload)
        .with_context(|| format!("cannot read workload {}", args.workload.display()))?;
    let workload = Workload::parse(&source)?;
    info!(
        "Loaded {} commands from {:?}",
        workload.len(),
        args.workload
    );

    let transport: Box<dyn DeviceTransport> = if args.memory {
        info!("Using in-process device");
        Box::new(MemoryDevice::new(config.geometry()?))
    } else {
        info!("Using cartridge bus at {}", config.server_address);
        let mut tcp = TcpTransport::new(config.server_address.clone());
        if let Some(ms) = args.timeout_ms {
            tcp = tcp.with_timeout(Duration::from_millis(ms));
        }
        Box::new(tcp)
    };

    let mut store = FrameStore::new(config, transport)?;
    store.power_on().context("power on failed")?;
    let outcome = workload.run(&mut store);
    store.power_off().context("power off failed")?;
    let report = outcome?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}
