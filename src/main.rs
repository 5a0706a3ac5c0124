//! hookrelay: forwards MQTT messages to chat webhooks.
//!
//! Loads configuration, connects to the broker, runs the bridge until
//! SIGINT/SIGTERM and drains pending notifications before exiting. Any fatal
//! delivery or broker error exits non-zero.

use std::sync::Arc;

use anyhow::{Context, Result};
use hookrelay_bridge::{Bridge, MqttBroker};
use hookrelay_core::{config::DEFAULT_CONFIG_FILE, BridgeConfig, RealClock};
use hookrelay_delivery::{ClientConfig, DeliveryClient, NoOpEventHandler};
use tracing::{error, info};

/// Environment variable overriding the configuration file path.
const CONFIG_PATH_ENV: &str = "HOOKRELAY_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config_path =
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    let config = BridgeConfig::load(&config_path)
        .with_context(|| format!("failed to load configuration from {config_path}"))?;
    info!(
        config = %config_path,
        broker = %config.mqtt_server.address,
        subscriptions = config.subscriptions.len(),
        "configuration loaded"
    );

    let (broker, events) =
        MqttBroker::connect(&config.mqtt_server).await.context("failed to connect to broker")?;
    let client = DeliveryClient::new(ClientConfig::from(&config.delivery))
        .context("failed to build HTTP client")?;

    let bridge = Bridge::start(
        config,
        Arc::new(broker),
        events,
        client,
        Arc::new(RealClock::new()),
        Arc::new(NoOpEventHandler::new()),
    )
    .await
    .context("failed to start bridge")?;

    match bridge.run_until(shutdown_signal()).await {
        Ok(report) => {
            info!(
                received = report.routed.received,
                delivered = report.dispatched.delivered,
                rate_limited = report.dispatched.rate_limited,
                "hookrelay shutdown complete"
            );
            Ok(())
        },
        Err(e) => {
            error!(error = %e, "hookrelay stopped on a fatal error");
            Err(e.into())
        },
    }
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hookrelay=debug"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Waits for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install SIGINT handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received SIGINT");
        },
        () = terminate => {
            info!("received SIGTERM");
        },
    }
}
