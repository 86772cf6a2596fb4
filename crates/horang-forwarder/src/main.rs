//! Horang Forwarder - directory-watching log forwarder

use anyhow::{Context, Result};
use clap::Parser;
use std::future::Future;
use horang_common::logging::{init_logging, LogConfig, LogLevel};
use horang_forwarder::config::{Destination, ForwarderConfig};
use horang_forwarder::forwarder::Forwarder;
use horang_forwarder::geoip::GeoIpResolver;
use horang_forwarder::poller::Poller;
use horang_forwarder::sink::{ElasticsearchSink, Sink, StdoutSink};
use horang_forwarder::Cli;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("horang-forwarder")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let mut config = ForwarderConfig::from_env().context("Failed to load configuration")?;
    cli.apply_to(&mut config);
    let config = config.validated()?;

    info!(
        root = %config.root.display(),
        destination = %config.destination,
        "Starting Horang forwarder"
    );

    let shutdown = shutdown_signal()?;
    let resolver = GeoIpResolver::open(&config.geoip)?;
    let result = run(config, &resolver, shutdown).await;
    resolver.close();

    if let Err(ref e) = result {
        error!(error = %e, "Forwarder stopped on fatal error");
    } else {
        info!("Forwarder shut down gracefully");
    }
    result
}

async fn run(
    config: ForwarderConfig,
    resolver: &GeoIpResolver,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let sink: Box<dyn Sink> = match config.destination {
        Destination::Elasticsearch => Box::new(
            ElasticsearchSink::connect(&config.elasticsearch)
                .await
                .context("Failed to connect to Elasticsearch")?,
        ),
        Destination::Stdout => Box::new(StdoutSink::stdout()),
    };

    let forwarder = Forwarder::new(sink, config.delivery.policy());
    let mut poller = Poller::new(config, resolver, forwarder);
    poller.run(shutdown).await?;
    Ok(())
}

/// Install the Ctrl+C and SIGTERM handlers now; the returned future resolves
/// on the first signal received after this call
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    use signal::unix::{signal, SignalKind};

    let mut interrupt =
        signal(SignalKind::interrupt()).context("Failed to install Ctrl+C handler")?;
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => {
                info!("Received Ctrl+C, shutting down");
            },
            _ = terminate.recv() => {
                info!("Received terminate signal, shutting down");
            },
        }
    })
}

#[cfg(windows)]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    let mut ctrl_c = signal::windows::ctrl_c().context("Failed to install Ctrl+C handler")?;

    Ok(async move {
        ctrl_c.recv().await;
        info!("Received Ctrl+C, shutting down");
    })
}
