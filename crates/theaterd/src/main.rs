use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use theaterd::config::ConfigError;
use theaterd::coordinator::JsonFileStore;
use theaterd::coordinator::StateStore;
use theaterd::integrations::mqtt::MqttClient;
use theaterd::integrations::mqtt::MqttSink;
use theaterd::integrations::mqtt::RumqttcClient;
use theaterd::Config;
use theaterd::Coordinator;
use theaterd::CoordinatorHandle;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Home theater coordinator daemon
#[derive(Parser, Debug)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(default_value = "theaterd.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config) {
        Ok((config, warnings)) => {
            if !warnings.is_empty() {
                eprint!("{}", theaterd::format_diagnostics(&warnings));
            }
            config
        }
        Err(ConfigError::Invalid(diagnostics)) => {
            eprint!("{}", theaterd::format_diagnostics(&diagnostics.0));
            anyhow::bail!("{} is invalid", cli.config.display());
        }
        Err(e) => return Err(e.into()),
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.targets())
        .init();

    tracing::info!("theaterd {} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!("Loaded config from: {}", cli.config.display());

    let mut client = RumqttcClient::new(&config.mqtt);
    client
        .connect()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to MQTT broker: {}", e))?;
    let sink = Arc::new(MqttSink::new(client, &config.mqtt));

    let store = StateStore::new(
        Arc::new(JsonFileStore::new(&config.storage.path)),
        config.storage.save_delay(),
    );
    let (theater, coordinator_task) =
        Coordinator::start(config.theater, store, sink.clone(), sink).await;

    let api = config.api.map(|api_config| {
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let theater = theater.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = theaterd::api::serve(api_config, theater, shutdown_rx).await {
                tracing::error!("HTTP API server failed: {}", e);
            }
        });
        (shutdown_tx, task)
    });

    tracing::info!("Press Ctrl+C to exit");
    wait_for_shutdown(&cli.config, &theater).await?;

    if let Some((shutdown_tx, task)) = api {
        let _ = shutdown_tx.send(());
        if let Err(e) = task.await {
            tracing::error!("HTTP API task failed: {}", e);
        }
    }

    theater
        .shutdown()
        .await
        .context("Theater coordinator stopped unexpectedly")?;
    coordinator_task
        .await
        .context("Theater coordinator task failed")?;

    tracing::info!("theaterd shutdown complete");

    Ok(())
}

/// Block until Ctrl+C, reloading the theater configuration on every SIGHUP.
async fn wait_for_shutdown(config_path: &Path, theater: &CoordinatorHandle) -> anyhow::Result<()> {
    let mut hangup = signal(SignalKind::hangup()).context("Failed to listen for SIGHUP")?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for shutdown signal")?;
                tracing::info!("Received shutdown signal");
                return Ok(());
            }
            _ = hangup.recv() => {
                reload(config_path, theater).await;
            }
        }
    }
}

/// Only the theater sections are reloaded; logging, storage, API and MQTT
/// settings need a restart.
async fn reload(config_path: &Path, theater: &CoordinatorHandle) {
    tracing::info!("Reloading {}", config_path.display());

    match Config::from_file(config_path) {
        Ok((config, warnings)) => {
            if !warnings.is_empty() {
                tracing::warn!(
                    "Reloaded config has warnings:\n{}",
                    theaterd::format_diagnostics(&warnings)
                );
            }
            if let Err(e) = theater.update_config(config.theater).await {
                tracing::error!("Failed to apply reloaded config: {}", e);
            }
        }
        Err(ConfigError::Invalid(diagnostics)) => {
            tracing::error!(
                "Reloaded config is invalid, keeping the running one:\n{}",
                theaterd::format_diagnostics(&diagnostics.0)
            );
        }
        Err(e) => {
            tracing::error!("Failed to reload config, keeping the running one: {}", e);
        }
    }
}
