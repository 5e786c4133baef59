use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hwwatch_engine::persist::{EventLog, SettingsStore};
use hwwatch_engine::{seed, Monitor};

#[derive(Parser, Debug)]
#[command(name = "hwwatch")]
#[command(about = "Hardware monitoring engine with rolling statistics and threshold alerting")]
struct Args {
    /// Path to the settings store
    #[arg(short, long, default_value = "monitor_settings.json")]
    settings: PathBuf,

    /// Path to the append-only event log
    #[arg(short, long, default_value = "monitor_log.json")]
    log: PathBuf,

    /// Generate a settings store from a metrics catalog JSON and exit
    #[arg(long, value_name = "CATALOG", conflicts_with_all = ["once", "history"])]
    seed: Option<PathBuf>,

    /// Set the sampling interval in seconds (persisted to the settings store)
    #[arg(short, long)]
    interval: Option<f64>,

    /// Per-metric collection timeout in seconds
    #[arg(long, default_value = "10")]
    timeout: u64,

    /// Write a snapshot JSON file after every tick
    #[arg(long, value_name = "PATH")]
    snapshot_output: Option<PathBuf>,

    /// Run a single collection cycle, print the snapshot JSON, and exit
    #[arg(long, conflicts_with = "history")]
    once: bool,

    /// Print logged violation events and exit
    #[arg(long)]
    history: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    if let Some(catalog_path) = &args.seed {
        let catalog = tokio::fs::read_to_string(catalog_path)
            .await
            .with_context(|| format!("reading metrics catalog {}", catalog_path.display()))?;
        let config = seed::seed_from_str(&catalog)?;
        SettingsStore::new(&args.settings).save(&config).await?;
        info!(
            settings = %args.settings.display(),
            metrics = config.metrics.len(),
            enabled = config.enabled_metrics().len(),
            "settings store seeded from catalog"
        );
        return Ok(());
    }

    if args.history {
        let events = EventLog::new(&args.log).violations().await?;
        for event in &events {
            println!("{}", serde_json::to_string(event)?);
        }
        info!(events = events.len(), log = %args.log.display(), "history printed");
        return Ok(());
    }

    let mut builder = Monitor::builder()
        .settings(&args.settings)
        .log(&args.log)
        .sample_timeout(Duration::from_secs(args.timeout));
    if let Some(path) = &args.snapshot_output {
        builder = builder.snapshot_output(path);
    }
    let monitor = builder.build().await?;

    if let Some(interval) = args.interval {
        monitor.set_interval(interval).await?;
    }

    if args.once {
        let events = monitor.tick_once().await?;
        info!(violations = events.len(), "single collection cycle complete");
        println!("{}", serde_json::to_string_pretty(&monitor.snapshot())?);
        return Ok(());
    }

    let enabled = monitor.state().enabled_metrics().len();
    if enabled == 0 {
        anyhow::bail!(
            "no metrics enabled in {}; seed a catalog with --seed or edit the settings store",
            args.settings.display()
        );
    }

    info!(
        metrics = enabled,
        interval_secs = monitor.state().general().interval_secs,
        "monitoring started; press ctrl-c to stop"
    );
    let handle = monitor.start();
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    handle.stop().await;
    info!("monitoring stopped");

    Ok(())
}
