// src/main.rs

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{eyre, Result, WrapErr};
use tracing::{error, info};

mod config;
mod core;
mod logging;

use crate::config::{Cli, Command, ScanArgs};
use crate::core::notifier::{LogNotifier, ModerationNotifier, WebhookNotifier};
use crate::core::orchestrator::ScanOrchestrator;
use crate::core::scanner::heuristics::HeuristicAnalyzer;
use crate::core::scanner::threat_intel::ThreatIntelClient;
use crate::core::scanner::UrlScanner;
use crate::core::store::{JobStore, SqliteJobStore};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    logging::initialize_logging(cli.verbose)?;

    let store_path = cli.store_path();
    let store: Arc<dyn JobStore> = Arc::new(
        SqliteJobStore::open(&store_path)
            .await
            .wrap_err_with(|| format!("Failed to open job store {}", store_path.display()))?,
    );

    match cli.command {
        Command::Run => {
            let orchestrator = build_orchestrator(&cli.scan, store)?;
            let outcome = orchestrator.run_once().await.wrap_err("Scan invocation failed")?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Watch { poll_interval_secs } => {
            let orchestrator = build_orchestrator(&cli.scan, store)?;
            watch(&orchestrator, Duration::from_secs(poll_interval_secs.max(1))).await?;
        }
        Command::Enqueue { target_table, target_id, urls } => {
            let job = store
                .enqueue(&target_table, &target_id, urls)
                .await
                .wrap_err("Failed to enqueue scan job")?;
            println!("{}", job.id);
        }
        Command::Status { scan_id } => {
            let job = store
                .get(scan_id)
                .await
                .wrap_err("Failed to read scan job")?
                .ok_or_else(|| eyre!("Scan job {scan_id} not found"))?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        Command::Check { url } => {
            let result = build_scanner(&cli.scan)?.scan(&url).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }
    Ok(())
}

fn build_scanner(args: &ScanArgs) -> Result<UrlScanner> {
    let threat_intel = ThreatIntelClient::new(args.threat_intel_config())
        .wrap_err("Failed to build threat intelligence client")?;
    let heuristics = HeuristicAnalyzer::new(args.heuristic_config());
    Ok(UrlScanner::new(Arc::new(threat_intel), heuristics))
}

fn build_orchestrator(
    args: &ScanArgs,
    store: Arc<dyn JobStore>,
) -> Result<ScanOrchestrator> {
    let notifier: Arc<dyn ModerationNotifier> = match &args.moderation_webhook {
        Some(endpoint) => Arc::new(
            WebhookNotifier::new(endpoint.clone(), args.request_timeout())
                .wrap_err("Failed to build moderation notifier")?,
        ),
        None => Arc::new(LogNotifier),
    };
    let scanner = build_scanner(args)?;
    Ok(ScanOrchestrator::new(store, scanner, notifier, args.orchestrator_config()))
}

/// Periodic scheduler: one invocation per tick until Ctrl-C. A failed
/// invocation is logged and the next tick runs as usual.
async fn watch(orchestrator: &ScanOrchestrator, period: Duration) -> Result<()> {
    info!(period_secs = period.as_secs(), "Starting scan worker loop.");
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match orchestrator.run_once().await {
                    Ok(outcome) => info!(
                        outcome = %serde_json::to_string(&outcome)?,
                        "Worker invocation finished."
                    ),
                    Err(e) => error!(error = %e, "Worker invocation failed."),
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.wrap_err("Failed to listen for Ctrl-C")?;
                info!("Shutdown requested, stopping worker loop.");
                return Ok(());
            }
        }
    }
}
