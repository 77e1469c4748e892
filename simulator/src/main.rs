//! Multiledger Simulator
//!
//! Drives the ledger engine with scripted and randomized workloads.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod controller;
mod metrics;
mod scenario;

use controller::SimulationController;
use metrics::SimulationMetrics;
use multiledger_ledger::{open_store, LedgerConfig, LedgerEngine, LedgerMetricsSnapshot, LogFormat};
use scenario::{LoadParams, Scenario};

/// Multiledger Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "Multiledger scenario and load driver")]
struct Args {
    /// Built-in scenario to run: walkthrough, withdraw-race, random-load
    #[arg(short, long, default_value = "walkthrough")]
    scenario: String,

    /// Run the scenario in this JSON file instead of a built-in one
    #[arg(long)]
    scenario_file: Option<PathBuf>,

    /// Accounts used by random-load
    #[arg(short, long, default_value = "8")]
    accounts: usize,

    /// Operations issued by withdraw-race and random-load
    #[arg(short, long, default_value = "1000")]
    operations: usize,

    /// Operations in flight at once during random-load
    #[arg(short, long, default_value = "16")]
    concurrency: usize,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Also print engine counters in Prometheus text format
    #[arg(long)]
    prometheus: bool,
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    scenario: &'a str,
    store: &'a str,
    elapsed_ms: u128,
    accounts_verified: usize,
    throughput_per_sec: f64,
    p50_latency_us: u64,
    p99_latency_us: u64,
    client: &'a SimulationMetrics,
    engine: LedgerMetricsSnapshot,
}

fn init_tracing(config: &LedgerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = LedgerConfig::from_env().map_err(anyhow::Error::msg)?;
    config.validate().map_err(anyhow::Error::msg)?;
    init_tracing(&config);

    info!("Starting Multiledger Simulator");
    info!("Store backend: {:?}", config.store);

    let params = LoadParams {
        accounts: args.accounts,
        operations: args.operations,
        concurrency: args.concurrency,
    };
    let scenario = match &args.scenario_file {
        Some(path) => Scenario::from_file(path)?,
        None => Scenario::load(&args.scenario, params)?,
    };

    let store = open_store(&config).await?;
    let engine = Arc::new(LedgerEngine::from_config(store, &config));
    let mut controller = SimulationController::new(engine.clone(), args.seed);

    let started = Instant::now();
    controller.run_scenario(&scenario).await?;
    let elapsed = started.elapsed();

    let verified = controller.verify_integrity().await?;
    info!("Integrity verified for {} accounts", verified);

    let metrics = controller.get_metrics().await;
    info!("Simulation complete");
    info!("Total operations: {}", metrics.total_operations);
    info!("Committed: {}", metrics.committed);
    info!("Rejected: {}", metrics.rejected);
    info!("Failed: {}", metrics.failed);
    info!("Average latency: {}us", metrics.average_latency_us());

    let summary = Summary {
        scenario: &scenario.name,
        store: engine.store().name(),
        elapsed_ms: elapsed.as_millis(),
        accounts_verified: verified,
        throughput_per_sec: metrics.throughput(elapsed),
        p50_latency_us: metrics.p50_latency_us(),
        p99_latency_us: metrics.p99_latency_us(),
        client: &metrics,
        engine: engine.metrics().snapshot(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if args.prometheus {
        print!("{}", engine.metrics().to_prometheus());
    }

    Ok(())
}
