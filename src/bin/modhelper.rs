//! modhelper CLI: drive the dispatcher from a terminal.

use clap::{Parser, Subcommand};
use modhelper_rs::catalog::Catalog;
use modhelper_rs::config::Config;
use modhelper_rs::dispatch::Dispatcher;
use modhelper_rs::host::MemoryEngine;
use modhelper_rs::model::{Dispatch, DrainReport, ItemOutcome, Position, SpawnRequest};
use modhelper_rs::spawn::SpawnRequestHandler;
use modhelper_rs::telemetry::{TelemetryConfig, init_telemetry};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "modhelper", about = "Main-thread spawn helper for mod hosts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Catalog operations
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Spawn one template and run a single tick
    Spawn {
        /// Resource path or catalog display name
        resource: String,
        #[arg(allow_hyphen_values = true)]
        x: f32,
        #[arg(allow_hyphen_values = true)]
        y: f32,
        #[arg(allow_hyphen_values = true)]
        z: f32,
        /// Catalog TOML (overrides MODHELPER_CATALOG)
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Print the drain report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a host loop: read `<resource> <x> <y> <z>` lines from stdin
    Run {
        /// Catalog TOML (overrides MODHELPER_CATALOG)
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Milliseconds between ticks (overrides MODHELPER_TICK_MS)
        #[arg(long)]
        tick_ms: Option<u64>,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// List catalog entries sorted by name
    List {
        #[arg(long)]
        catalog: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "modhelper".to_string(),
        log_level: config.log_level.clone(),
    })?;

    match cli.command {
        Command::Catalog {
            action: CatalogAction::List { catalog, json },
        } => cmd_catalog_list(&config, catalog, json),
        Command::Spawn {
            resource,
            x,
            y,
            z,
            catalog,
            json,
        } => {
            let request = SpawnRequest::new(resource, Position::new(x, y, z));
            cmd_spawn(&config, catalog, request, json)
        }
        Command::Run { catalog, tick_ms } => {
            let mut config = config;
            if let Some(ms) = tick_ms {
                anyhow::ensure!(ms > 0, "--tick-ms must be positive");
                config.tick_interval = Duration::from_millis(ms);
            }
            cmd_run(&config, catalog).await
        }
    }
}

fn load_catalog(config: &Config, flag: Option<PathBuf>) -> anyhow::Result<Option<Catalog>> {
    match flag.or_else(|| config.catalog_path.clone()) {
        Some(path) => Ok(Some(Catalog::load(&path)?)),
        None => Ok(None),
    }
}

/// Wire up an in-memory engine, a dispatcher bound to this thread, and a
/// handler over them.
fn build_host(
    config: &Config,
    catalog: Option<Catalog>,
) -> (Arc<MemoryEngine>, Arc<SpawnRequestHandler>) {
    let engine = match &catalog {
        Some(catalog) => MemoryEngine::from_catalog(catalog),
        None => MemoryEngine::new(),
    };
    let engine = Arc::new(engine.set_headless(config.headless));

    let dispatcher = Arc::new(Dispatcher::new(engine.clone()));
    let mut handler = SpawnRequestHandler::new(dispatcher);
    if let Some(catalog) = catalog {
        handler = handler.with_catalog(Arc::new(catalog));
    }
    (engine, Arc::new(handler))
}

fn cmd_catalog_list(config: &Config, flag: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let Some(catalog) = load_catalog(config, flag)? else {
        anyhow::bail!("no catalog given; pass --catalog or set MODHELPER_CATALOG");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(catalog.entries())?);
        return Ok(());
    }

    if catalog.is_empty() {
        println!("Catalog is empty.");
        return Ok(());
    }

    println!("{:<32}  {:<8}  PATH", "NAME", "PREFAB");
    println!("{}", "-".repeat(90));
    for entry in catalog.entries() {
        let prefab = if entry.instantiable { "yes" } else { "no" };
        println!("{:<32}  {:<8}  {}", entry.name, prefab, entry.path);
    }
    println!("\n{} entr(ies)", catalog.len());
    Ok(())
}

fn cmd_spawn(
    config: &Config,
    flag: Option<PathBuf>,
    request: SpawnRequest,
    json: bool,
) -> anyhow::Result<()> {
    let catalog = load_catalog(config, flag)?;
    let (_engine, handler) = build_host(config, catalog);

    let report = match handler.spawn_by_name_or_path(request)? {
        Dispatch::Inline(outcome) => {
            println!("No execution context; ran inline.");
            let mut report = DrainReport::new();
            report.record(outcome);
            report
        }
        Dispatch::Queued => handler
            .dispatcher()
            .tick()
            .unwrap_or_else(DrainReport::new),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    let cleanup = handler.cleanup_report();
    anyhow::ensure!(cleanup.is_success(), "cleanup failed: {:?}", cleanup.failure);
    Ok(())
}

async fn cmd_run(config: &Config, flag: Option<PathBuf>) -> anyhow::Result<()> {
    let catalog = load_catalog(config, flag)?;
    let (engine, handler) = build_host(config, catalog);

    // stdin is blocking, so the producer gets its own thread
    let (done_tx, mut done_rx) = tokio::sync::oneshot::channel::<()>();
    let producer = Arc::clone(&handler);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("stdin read error: {e}");
                    break;
                }
            };
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            match line.parse::<SpawnRequest>() {
                Ok(request) => {
                    let _ = producer.spawn_by_name_or_path(request);
                }
                Err(e) => warn!("skipping line: {e}"),
            }
        }
        let _ = done_tx.send(());
    });

    info!(tick_ms = config.tick_interval.as_millis() as u64, "host loop started");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(config.tick_interval);

    // Ticks must run here: the dispatcher is bound to this thread.
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(report) = handler.dispatcher().tick() {
                    if !report.is_empty() {
                        print_report(&report);
                    }
                }
            }
            _ = &mut done_rx => {
                if let Some(report) = handler.dispatcher().tick() {
                    print_report(&report);
                }
                info!("input closed, shutting down");
                break;
            }
            _ = &mut ctrl_c => {
                info!("interrupted, shutting down");
                break;
            }
        }
    }

    let cleanup = handler.cleanup_report();
    println!(
        "Shutdown: {} instance(s) live, {} pending item(s) discarded.",
        engine.instances().len(),
        cleanup.discarded
    );
    anyhow::ensure!(cleanup.is_success(), "cleanup failed: {:?}", cleanup.failure);
    Ok(())
}

fn print_report(report: &DrainReport) {
    for outcome in &report.outcomes {
        match outcome {
            ItemOutcome::Spawned {
                resource_id,
                instance,
                position,
            } => println!("spawned   {resource_id} as {instance} at {position}"),
            ItemOutcome::Completed => println!("completed task"),
            ItemOutcome::Failed { kind, message } => println!("failed    [{kind}] {message}"),
        }
    }
    println!(
        "tick {}: {} executed, {} failed",
        report.started_at.format("%H:%M:%S%.3f"),
        report.executed,
        report.failed
    );
}
