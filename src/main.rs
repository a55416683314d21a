//! txforge service entry point

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use txforge::builder::{BuildOrchestrator, WireAssembler};
use txforge::config::Config;
use txforge::indexer::HttpUtxoProvider;
use txforge::metrics::Metrics;
use txforge::server::{self, AppState};
use txforge::telemetry::{
    MonotonicClock, ReceiptsSummaryFetcher, SchedulerSummaryFetcher, SummaryCache,
};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Bind address, overriding the config file
    #[arg(long)]
    bind: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    info!("🚀 Starting txforge");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    info!("📋 Loading configuration from: {}", args.config);
    let mut config = Config::from_file_with_env(&args.config)?;
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    config.validate().context("Configuration invalid")?;
    info!("Effective configuration:\n{}", config.describe());

    let metrics = Arc::new(Metrics::new()?);
    let client = reqwest::Client::new();

    let clock = Arc::new(MonotonicClock);
    let ttl = Duration::from_secs(config.telemetry.ttl_secs);
    let soft_window = Duration::from_secs(config.telemetry.stale_soft_window_secs);
    let fetch_timeout = Duration::from_millis(config.telemetry.fetch_timeout_ms);

    let receipts = config.telemetry.receipts_url.clone().map(|url| {
        info!("📡 Receipts telemetry source: {}", url);
        SummaryCache::new(
            "receipts",
            ttl,
            soft_window,
            clock.clone(),
            Arc::new(ReceiptsSummaryFetcher::new(client.clone(), url, fetch_timeout)),
        )
        .with_counters(metrics.cache_counters("receipts"))
    });
    let scheduler = config.telemetry.scheduler_url.clone().map(|url| {
        info!("📡 Scheduler telemetry source: {}", url);
        SummaryCache::new(
            "scheduler",
            ttl,
            soft_window,
            clock.clone(),
            Arc::new(SchedulerSummaryFetcher::new(client.clone(), url, fetch_timeout)),
        )
        .with_counters(metrics.cache_counters("scheduler"))
    });

    let provider = Arc::new(HttpUtxoProvider::new(
        client,
        config.indexer.base_url.clone(),
        Duration::from_millis(config.indexer.timeout_ms),
    ));

    let orchestrator = Arc::new(BuildOrchestrator::new(
        config.policy.clone(),
        provider,
        Arc::new(WireAssembler::new()),
        receipts,
        scheduler,
        metrics.clone(),
    ));

    let addr: SocketAddr = config
        .server
        .bind_addr
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind_addr))?;
    let state = AppState { orchestrator, metrics };

    tokio::select! {
        result = server::run_server(addr, state) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Shutdown signal received, exiting");
        }
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "txforge=debug,info" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
