//! smsbridge - SMS to Telegram relay
//!
//! Subscribes to the SMS topic on the local MQTT broker and forwards every
//! message to the configured Telegram chats. Runs until it is signalled.

use anyhow::Result;
use clap::Parser;
use smsbridge::{
    app::App,
    cli::Cli,
    config::Config,
    internal_metrics::{describe_metrics, logging_recorder::LoggingRecorder},
};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            tracing_subscriber::fmt().init();
            error!("Failed to load configuration: {}", err);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("MQTT Broker: {}:{}", config.broker.host, config.broker.port);
    info!("MQTT Topic: {}", config.broker.topic);
    info!("Reconnect Delay: {}s", config.broker.reconnect_delay_secs);
    info!(
        "Telegram Bot Token: {}",
        if config.telegram.usable_token().is_some() {
            "Configured"
        } else {
            "Not configured"
        }
    );
    info!("Telegram Chats: {}", config.telegram.chat_ids.join(", "));
    info!("Log Metrics: {}", config.metrics.log_metrics);
    info!("-------------------------------------------------------");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut metrics_task = None;
    if config.metrics.log_metrics {
        let recorder = LoggingRecorder::new();
        metrics_task = Some(recorder.spawn_reporter(
            Duration::from_secs(config.metrics.log_interval_secs.max(1)),
            shutdown_rx.clone(),
        ));
        if metrics::set_global_recorder(recorder).is_err() {
            warn!("A metrics recorder is already installed.");
        }
        describe_metrics();
    }

    let app = App::builder(config).build(shutdown_rx).await?;
    let app_handle = tokio::spawn(app.run());

    wait_for_signal().await;
    info!("Shutdown signal received. Shutting down...");
    let _ = shutdown_tx.send(true);

    match app_handle.await {
        Ok(Err(e)) => error!("Application error during shutdown: {}", e),
        Err(e) => error!("Application task panicked: {:?}", e),
        Ok(Ok(())) => {}
    }
    if let Some(handle) = metrics_task {
        let _ = handle.await;
    }

    info!("Exiting.");
    Ok(())
}

/// Resolves on Ctrl-C, or on SIGTERM where available.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
                return;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
