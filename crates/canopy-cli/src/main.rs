//! Canopy command-line entry point.
//!
//! Wires configuration, the target registry, the adapters and a snapshot
//! store into a [`ScrapeOrchestrator`] and runs one or all targets.

mod cli;

use anyhow::{Context, Result};
use canopy_adapters::{
    AdapterContext, AdapterSet, FileSessionSource, IdentityController, ReqwestTransport,
};
use canopy_browser::ChromiumDriver;
use canopy_core::{AppConfig, RunStatus, SnapshotStore, TargetId, TargetRegistry};
use canopy_db::Database;
use canopy_pipeline::{MemoryStore, ResilienceLayer, RunOptions, RunReport, ScrapeOrchestrator};
use clap::Parser;
use cli::{Cli, Command};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Initialize tracing subscriber for logging
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,canopy=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every run avoided the failed status.
async fn run(cli: Cli) -> Result<bool> {
    let config = AppConfig::load_with_env().context("failed to load configuration")?;

    let registry_path = match &cli.registry {
        Some(path) => path.clone(),
        None => config.scraping.registry_path()?,
    };
    let registry = TargetRegistry::load_file(&registry_path)
        .with_context(|| format!("failed to load targets from {}", registry_path.display()))?;

    if cli.command == Command::Targets {
        print_targets(&registry);
        return Ok(true);
    }

    info!("Starting Canopy v{}", env!("CARGO_PKG_VERSION"));
    let orchestrator = build_orchestrator(&config, registry, cli.dry_run).await?;

    let reports = match cli.command {
        Command::Run {
            target,
            max_pages,
            timeout_ms,
        } => {
            let target_id = TargetId::new(target)?;
            let mut options = orchestrator.options();
            if let Some(max_pages) = max_pages {
                options = options.with_max_pages(max_pages);
            }
            if let Some(timeout_ms) = timeout_ms {
                options = options.with_timeout(Duration::from_millis(timeout_ms));
            }
            let report = orchestrator
                .with_options(options)
                .run_one(&target_id)
                .await?;
            vec![report]
        }
        Command::RunAll {
            concurrency,
            max_pages,
        } => {
            let mut orchestrator = orchestrator;
            if let Some(concurrency) = concurrency {
                orchestrator = orchestrator.with_max_concurrent_runs(concurrency);
            }
            if let Some(max_pages) = max_pages {
                let options = orchestrator.options().with_max_pages(max_pages);
                orchestrator = orchestrator.with_options(options);
            }

            let mut reports = Vec::new();
            for result in orchestrator.run_all().await {
                match result {
                    Ok(report) => reports.push(report),
                    Err(e) => error!("{}", e),
                }
            }
            reports
        }
        Command::Targets => Vec::new(),
    };

    for report in &reports {
        print_report(report, cli.json)?;
    }
    Ok(reports.iter().all(|r| r.run.status() != RunStatus::Failed))
}

async fn build_orchestrator(
    config: &AppConfig,
    registry: TargetRegistry,
    dry_run: bool,
) -> Result<ScrapeOrchestrator> {
    let controller = Arc::new(IdentityController::new(&config.rate_limits, &config.proxy));
    let context = AdapterContext {
        controller: controller.clone(),
        transport: Arc::new(ReqwestTransport::new(Duration::from_secs(
            config.scraping.request_timeout_secs,
        ))),
        browser: Arc::new(ChromiumDriver::new(
            config.browser.headless,
            Duration::from_secs(config.browser.navigation_timeout_secs),
        )),
        sessions: Arc::new(FileSessionSource::new(config.storage.sessions_dir()?)),
        browser_config: Arc::new(config.browser.clone()),
    };
    let resilience = Arc::new(ResilienceLayer::new(
        AdapterSet::standard(&context),
        controller,
    ));

    let store: Arc<dyn SnapshotStore> = if dry_run {
        info!("Dry run, results are kept in memory");
        Arc::new(MemoryStore::new())
    } else {
        let path = config.storage.database_path()?;
        let db = Database::new(&path)
            .await
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        db.run_migrations().await?;
        Arc::new(db.snapshot_store())
    };

    Ok(
        ScrapeOrchestrator::new(Arc::new(registry), resilience, store)
            .with_options(RunOptions::from_config(&config.scraping))
            .with_max_concurrent_runs(config.scraping.max_concurrent_runs),
    )
}

fn print_targets(registry: &TargetRegistry) {
    for target in registry.all() {
        println!(
            "{:<32} {:<18} {:<13} {}",
            target.id.as_str(),
            target.family.as_str(),
            target.menu_type.as_str(),
            target.name
        );
    }
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "run": report.run,
            "delta": report.delta,
            "attempts": report.attempts.iter().map(|a| serde_json::json!({
                "strategy": a.strategy,
                "outcome": a.outcome,
                "listings": a.listings,
                "pages": a.pages,
                "truncated": a.truncated,
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string(&value)?);
        return Ok(());
    }

    let run = &report.run;
    let strategy = run
        .winning_strategy()
        .map_or_else(|| "-".to_string(), |s| s.to_string());
    match run.failure() {
        Some(cause) => println!(
            "{} {} listings={} strategy={} cause={}",
            run.target_id(),
            run.status(),
            run.listing_count(),
            strategy,
            cause
        ),
        None => println!(
            "{} {} listings={} strategy={}",
            run.target_id(),
            run.status(),
            run.listing_count(),
            strategy
        ),
    }
    if let Some(delta) = &report.delta {
        println!(
            "  appeared={} disappeared={} retained={}",
            delta.appeared.len(),
            delta.disappeared.len(),
            delta.retained
        );
    }
    Ok(())
}
