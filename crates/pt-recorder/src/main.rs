use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pt_recorder::{
    config::Config,
    metrics::{CounterClient, StatsReporter},
    recording::Recorder,
    services::{BackendClient, RecordPoller},
};

#[derive(Parser)]
#[command(name = "pt-recorder")]
#[command(version)]
#[command(about = "Broadcast capture scheduler reconciling backend reservations")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("pt_recorder={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting pt-recorder v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    std::fs::create_dir_all(&config.capture.output_dir)?;
    info!("Capture output directory: {:?}", config.capture.output_dir);

    let client = BackendClient::new(&config.backend)?;
    match client.ping().await {
        Ok(_) => info!("Backend reachable at {}", config.backend.endpoint),
        // the poller keeps retrying, so a dead backend at startup is not fatal
        Err(e) => warn!("Backend ping failed: {}", e),
    }

    let (snapshot_tx, snapshot_rx) = mpsc::channel(16);
    let recorder = Recorder::new(snapshot_rx);
    let stats = recorder.stats();
    let shutdown = CancellationToken::new();

    let poller = RecordPoller::new(
        client,
        config.capture.clone(),
        snapshot_tx,
        config.backend.poll_interval()?,
    )?;
    tokio::spawn(poller.run(shutdown.clone()));

    if let Some(metrics_config) = &config.metrics {
        let reporter = StatsReporter::new(
            CounterClient::new(metrics_config)?,
            stats.clone(),
            metrics_config.report_interval()?,
        );
        tokio::spawn(reporter.run(shutdown.clone()));
    } else {
        info!("Stats reporter disabled (no [metrics] configuration)");
    }

    let recorder_handle = tokio::spawn(recorder.run(
        config.recorder.sweep_interval()?,
        shutdown.clone(),
    ));

    info!("All services started");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    shutdown.cancel();
    recorder_handle.await?;

    Ok(())
}
