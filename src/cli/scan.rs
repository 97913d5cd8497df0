use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::browser::{LaunchOptions, PlaywrightBrowser};
use crate::cli::commands::{ScanArgs, ValidateArgs};
use crate::cli::progress::ScanProgress;
use crate::config::{self, ScanSettings};
use crate::errors::ScanError;
use crate::evidence::FsEvidenceSink;
use crate::models::SessionReport;
use crate::payloads::PayloadCatalog;
use crate::pipeline::{FuzzOrchestrator, ScanEvent};
use crate::reporting;

pub async fn handle_scan(args: ScanArgs, quiet: bool) -> Result<(), ScanError> {
    let file_config = match &args.config {
        Some(path) => Some(config::parse_config(path).await?),
        None => None,
    };

    let mut settings = file_config
        .as_ref()
        .map(ScanSettings::from_config)
        .unwrap_or_default();
    args.apply(&mut settings);
    config::validate_settings(&settings)?;

    let raw_target = args
        .target
        .clone()
        .or_else(|| file_config.as_ref().and_then(|c| c.target.clone()))
        .ok_or_else(|| ScanError::Config("No target given (use --target or the config file)".into()))?;
    let target = config::validate_target(&raw_target)?;

    let catalog = PayloadCatalog::load(&settings.wordlists, settings.wordlist_mode).await?;
    info!(
        templates = catalog.len(),
        target = %target,
        build = env!("GIT_HASH"),
        "Starting scan"
    );

    let evidence = Arc::new(FsEvidenceSink::initialize(&settings.output_dir).await?);
    let browser = PlaywrightBrowser::launch(&LaunchOptions {
        headless: settings.headless,
        navigation_timeout_ms: settings.navigation_timeout_ms,
        user_agent: None,
        har_path: Some(evidence.root().join("network.har")),
        node: args.node.clone(),
    })
    .await?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current attempt");
            interrupt.cancel();
        }
    });

    let (tx, rx) = mpsc::unbounded_channel();
    let progress = (!quiet).then(|| tokio::spawn(render_progress(rx)));

    let orchestrator = FuzzOrchestrator::new(target, settings.clone(), catalog, Box::new(browser), evidence)
        .with_cancel_token(cancel)
        .with_event_channel(tx);
    let report = orchestrator.run().await;

    if let Some(handle) = progress {
        let _ = handle.await;
    }

    print!("{}", reporting::render(&report, args.format)?);
    info!(path = %settings.output_dir.join("report.json").display(), "Report written");

    session_outcome(&report)
}

async fn render_progress(mut rx: mpsc::UnboundedReceiver<ScanEvent>) {
    let mut progress = ScanProgress::new();
    while let Some(event) = rx.recv().await {
        progress.handle_event(&event);
    }
}

/// A session aborted by a fatal error still exits non-zero.
fn session_outcome(report: &SessionReport) -> Result<(), ScanError> {
    match &report.error {
        None => Ok(()),
        Some(record) if record.error_type == "FatalBrowserError" => {
            Err(ScanError::FatalBrowser(record.message.clone()))
        }
        Some(record) => Err(ScanError::Internal(format!("{}: {}", record.error_type, record.message))),
    }
}

pub async fn handle_validate(args: ValidateArgs) -> Result<(), ScanError> {
    let config = config::parse_config(&args.config).await?;
    let settings = ScanSettings::from_config(&config);
    if let Some(target) = &config.target {
        config::validate_target(target)?;
    }
    println!("Configuration is valid: {}", args.config.display());
    println!(
        "  seed {} | evasion {:?} | policy {} | budget {} ({} per point) | dwell {}ms",
        settings.seed,
        settings.evasion,
        settings.severity_policy,
        settings.max_payloads,
        settings.max_payloads_per_point,
        settings.dwell_timeout_ms
    );
    Ok(())
}
