//! Drought Data Service - collection and reconstruction runner
//!
//! One invocation performs one pass:
//! 1. collect: fetch new raw readings per entity from WAMIS into PostgreSQL
//! 2. process: rebuild every configured daily series from the stored history,
//!    write CSVs for the drought-index scripts and replace the series tables
//!
//! Independent pipelines (each collector, each series) run side by side on
//! a small thread pool, each with its own database connection.
//!
//! Usage:
//!   cargo run --release                           # collect, then process
//!   cargo run --release -- collect                # collection only
//!   cargo run --release -- process --dry-run      # read-only database, CSVs only
//!   cargo run --release -- all --config other.toml
//!
//! Environment:
//!   DATABASE_URL  - PostgreSQL connection string
//!   WAMIS_API_KEY - WAMIS open API key (if not set in drought.toml)

use std::env;
use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use std::time::Duration as StdDuration;

use chrono::{Duration, Local};
use threadpool::ThreadPool;

use drought_service::collector::Collector;
use drought_service::config::{self, CollectorConfig, ServiceConfig, SourceKind};
use drought_service::error::Result;
use drought_service::ingest::wamis::{WamisClient, WamisDamAdapter, WamisFlowAdapter};
use drought_service::logging::ServiceLogger;
use drought_service::model::RunSummary;
use drought_service::processor::Processor;
use drought_service::store::memory::DryRunStore;
use drought_service::store::postgres::PostgresStore;
use drought_service::store::{CollectionStore, ReconstructionStore, SourceAdapter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Collect,
    Process,
    All,
}

struct Args {
    command: Command,
    config_path: PathBuf,
    dry_run: bool,
}

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} [collect|process|all] [--config PATH] [--dry-run]", program);
    std::process::exit(1);
}

fn parse_args() -> Args {
    let args: Vec<String> = env::args().collect();
    let mut parsed = Args {
        command: Command::All,
        config_path: PathBuf::from(config::DEFAULT_CONFIG_PATH),
        dry_run: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "collect" => parsed.command = Command::Collect,
            "process" => parsed.command = Command::Process,
            "all" => parsed.command = Command::All,
            "--dry-run" => parsed.dry_run = true,
            "--config" => {
                if i + 1 < args.len() {
                    parsed.config_path = PathBuf::from(&args[i + 1]);
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path");
                    usage(&args[0]);
                }
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                usage(&args[0]);
            }
        }
        i += 1;
    }
    parsed
}

fn main() {
    println!("💧 Drought Data Service");
    println!("=======================\n");

    let args = parse_args();

    let config = match config::load_config(&args.config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Configuration failed: {}\n", e);
            std::process::exit(1);
        }
    };

    let logger = match ServiceLogger::from_config(&config.logging) {
        Ok(logger) => Arc::new(logger),
        Err(e) => {
            eprintln!("\n❌ Logger setup failed: {}\n", e);
            std::process::exit(1);
        }
    };

    let mut summaries = Vec::new();

    if args.dry_run {
        println!("🧪 Dry run: reading from PostgreSQL, writes stay in memory (CSVs are still written)\n");
    }

    let config = Arc::new(config);
    if args.command != Command::Process {
        summaries.extend(run_parallel_collectors(&config, &logger, args.dry_run));
    }
    if args.command != Command::Collect {
        summaries.extend(run_parallel_series(&config, &logger, args.dry_run));
    }

    println!("\n📋 Run summary");
    let mut clean = true;
    for summary in &summaries {
        let glyph = if summary.is_clean() { "✓" } else { "✗" };
        println!("   {} {}", glyph, summary);
        for failure in &summary.failed {
            println!("      - {} ({}): {}", failure.key, failure.stage, failure.message);
        }
        clean &= summary.is_clean();
    }

    if !clean {
        std::process::exit(2);
    }
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

fn build_adapter(config: &ServiceConfig, collector: &CollectorConfig) -> Result<Box<dyn SourceAdapter>> {
    let client = WamisClient::new(&config.wamis.base_url, &config.wamis.resolve_api_key()?)?;
    Ok(match collector.source {
        SourceKind::WamisDam => Box::new(WamisDamAdapter::new(client)),
        SourceKind::WamisFlow => Box::new(WamisFlowAdapter::new(client)),
    })
}

fn run_collector<S: CollectionStore + ?Sized>(
    config: &ServiceConfig,
    collector: &CollectorConfig,
    store: &mut S,
    logger: &dyn log::Log,
) -> RunSummary {
    let adapter = match build_adapter(config, collector) {
        Ok(adapter) => adapter,
        Err(e) => {
            let mut summary = RunSummary::new(&collector.name);
            summary.aborted = Some(e.to_string());
            return summary;
        }
    };

    Collector::new(
        &collector.name,
        collector.entities.clone(),
        Duration::days(collector.default_lookback_days),
        StdDuration::from_millis(config.collection.inter_entity_delay_ms),
        logger,
    )
    .run(adapter.as_ref(), store, Local::now().naive_local())
}

fn run_series<S: ReconstructionStore + ?Sized>(
    config: &ServiceConfig,
    name: &str,
    store: &mut S,
    logger: &dyn log::Log,
) -> RunSummary {
    let Some(series) = config.series.iter().find(|s| s.name == name) else {
        let mut summary = RunSummary::new(name);
        summary.aborted = Some("series not configured".to_string());
        return summary;
    };

    Processor::new(
        series.clone(),
        config.reconstruction.clone(),
        config.windows_for(name),
        config.weight_overrides(),
        logger,
    )
    .run(store, Local::now().date_naive())
}

fn connect_or_abort(name: &str, series_table: Option<&str>) -> std::result::Result<PostgresStore, RunSummary> {
    PostgresStore::connect(series_table).map_err(|e| {
        eprintln!("\n❌ Database connection failed for {}:\n{}\n", name, e);
        let mut summary = RunSummary::new(name);
        summary.aborted = Some("database unavailable".to_string());
        summary
    })
}

fn run_parallel_collectors(config: &Arc<ServiceConfig>, logger: &Arc<ServiceLogger>, dry_run: bool) -> Vec<RunSummary> {
    let pool = ThreadPool::new(config.collection.max_parallel_pipelines);
    let (tx, rx) = mpsc::channel();

    for index in 0..config.collectors.len() {
        let (config, logger, tx) = (Arc::clone(config), Arc::clone(logger), tx.clone());
        pool.execute(move || {
            let collector = &config.collectors[index];
            let summary = match connect_or_abort(&collector.name, None) {
                Ok(store) if dry_run => run_collector(&config, collector, &mut DryRunStore::new(store), logger.as_ref()),
                Ok(mut store) => run_collector(&config, collector, &mut store, logger.as_ref()),
                Err(summary) => summary,
            };
            let _ = tx.send(summary);
        });
    }
    drop(tx);

    let summaries: Vec<RunSummary> = rx.iter().collect();
    pool.join();
    summaries
}

fn run_parallel_series(config: &Arc<ServiceConfig>, logger: &Arc<ServiceLogger>, dry_run: bool) -> Vec<RunSummary> {
    let pool = ThreadPool::new(config.collection.max_parallel_pipelines);
    let (tx, rx) = mpsc::channel();

    for series in &config.series {
        let name = series.name.clone();
        let table = series.persist_table.clone();
        let (config, logger, tx) = (Arc::clone(config), Arc::clone(logger), tx.clone());
        pool.execute(move || {
            let summary = match connect_or_abort(&name, table.as_deref()) {
                Ok(store) if dry_run => run_series(&config, &name, &mut DryRunStore::new(store), logger.as_ref()),
                Ok(mut store) => run_series(&config, &name, &mut store, logger.as_ref()),
                Err(summary) => summary,
            };
            let _ = tx.send(summary);
        });
    }
    drop(tx);

    let summaries: Vec<RunSummary> = rx.iter().collect();
    pool.join();
    summaries
}
