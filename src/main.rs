//! Basestation agent entry point: CLI, logging, signal handlers, async runtime.

mod app;
mod basestation;
mod config;
mod error;
mod fleet;
mod hardware;
mod mqtt;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use app::cli::Args;
use app::logging::{init_tracing, resolve_filter};
use config::credentials::MqttCredentials;
use config::types::AgentSettings;
use error::LinkError;
use fleet::FleetController;
use hardware::{BasestationRadio, LighthouseRadio};
use mqtt::{FleetCommand, MqttConnector};

const SIGNAL_CAPACITY: usize = 16;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Priority: 1. --log-level flag, 2. LOG_LEVEL env, 3. default (info)
    let env_level = std::env::var("LOG_LEVEL").ok();
    init_tracing(resolve_filter(args.log_level.as_deref(), env_level.as_deref()));

    info!(
        "Basestation Agent v{} starting ({})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    );

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }

    info!("Agent shutdown complete");
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let settings = AgentSettings::from(&args);
    let credentials = MqttCredentials::load();
    debug!("Broker credentials: {:?}", credentials);

    let connector = MqttConnector::new(settings.broker.clone());
    let run_once = settings.run_once;

    // Bluetooth is opened only once the broker has acknowledged the session
    let open_radio = |scan_duration: Duration| async move {
        let radio = LighthouseRadio::new(scan_duration).await?;
        Ok::<Arc<dyn BasestationRadio>, LinkError>(Arc::new(radio))
    };

    let (mut controller, commands) =
        FleetController::start(settings, &credentials, &connector, open_radio)
            .await
            .context("Startup failed")?;

    if run_once {
        info!("Single pass complete, exiting");
    } else {
        controller
            .run(commands, signal_commands(), shutdown_signal())
            .await
            .context("Agent stopped")?;
    }

    if let Err(e) = controller.publisher().close().await {
        warn!("Failed to close broker session cleanly: {}", e);
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received (Ctrl+C)");
}

/// SIGHUP requests a health-check pass.
fn signal_commands() -> mpsc::Receiver<FleetCommand> {
    let (tx, rx) = mpsc::channel(SIGNAL_CAPACITY);

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::hangup()) {
            Ok(mut sighup) => {
                tokio::spawn(async move {
                    while sighup.recv().await.is_some() {
                        info!("SIGHUP received, running health check");
                        if tx.send(FleetCommand::TestAll).await.is_err() {
                            break;
                        }
                    }
                });
            }
            Err(e) => warn!("Failed to setup SIGHUP handler: {}", e),
        }
    }
    #[cfg(not(unix))]
    drop(tx);

    rx
}
