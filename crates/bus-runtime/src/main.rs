//! # Bus Runtime
//!
//! Composition root: builds one `MessageBus`, wires the application
//! collaborators to it, publishes a short burst of demo traffic and runs
//! until Ctrl+C (or `BUS_RUN_FOR_MS`).
//!
//! ```text
//! main ──→ MessageBus ──start()──→ scheduler / retry / optimizer tasks
//!              │
//!              ├── SceneLoader  (scene-load → scene-ready)
//!              ├── Wallet       (wallet-sync → balance-updated, retried)
//!              └── Alerts       (message-error, scene-ready, balance-updated)
//! ```
//!
//! On exit the workers are stopped, final statistics are printed as JSON on
//! stdout and the bus is cleaned up.

mod collaborators;
mod config;
mod telemetry;

use anyhow::{Context, Result};
use module_bus::{MessageBus, MessageBusApi, Priority, RetryPolicy};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::collaborators::events::{SCENE_LOAD, TELEMETRY_SAMPLE, WALLET_SYNC};
use crate::collaborators::{Alerts, SceneLoader, Wallet};
use crate::config::RuntimeConfig;

/// Failed wallet requests before the simulated chain endpoint recovers.
const WALLET_OUTAGE: u32 = 2;

fn publish_demo_traffic(bus: &MessageBus) {
    bus.publish(
        SCENE_LOAD,
        json!({"id": 1, "name": "lobby"}),
        Priority::Critical,
    );
    bus.publish(WALLET_SYNC, json!({"account": "main"}), Priority::High);
    for sample in 0..12 {
        bus.publish(
            TELEMETRY_SAMPLE,
            json!({"sample": sample, "fps": 60}),
            Priority::Low,
        );
    }
    // Rejected by the loader, surfaces as a message-error.
    bus.publish(SCENE_LOAD, json!({"id": 2, "name": ""}), Priority::Normal);
}

async fn wait_for_exit(run_for_ms: Option<u64>) -> Result<()> {
    match run_for_ms {
        Some(ms) => {
            info!(run_for_ms = ms, "Running for a fixed duration");
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
                result = tokio::signal::ctrl_c() => result.context("failed to listen for Ctrl+C")?,
            }
        }
        None => {
            info!("Bus is running. Press Ctrl+C to stop.");
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl+C")?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = RuntimeConfig::from_env();
    telemetry::init_logging(&config)?;

    let bus = MessageBus::new(config.bus.clone()).context("invalid bus configuration")?;
    bus.set_retry_policy(WALLET_SYNC, RetryPolicy::new(3, 200));
    let workers = bus.start().context("failed to start bus workers")?;

    let api: Arc<dyn MessageBusApi> = Arc::new(bus.clone());
    let scene = SceneLoader::attach(Arc::clone(&api));
    let wallet = Wallet::attach(Arc::clone(&api), WALLET_OUTAGE);
    let alerts = Alerts::attach(Arc::clone(&api));
    // Telemetry samples have no subscriber yet; each delivery logs a warning.

    publish_demo_traffic(&bus);
    wait_for_exit(config.run_for_ms).await?;

    info!("Initiating graceful shutdown...");
    workers.shutdown().await;

    info!(
        wallet_requests = wallet.requests(),
        permanent_failures = alerts.failures(),
        "Collaborators finished"
    );
    let stats = serde_json::to_string_pretty(&bus.stats()).context("failed to encode stats")?;
    println!("{stats}");

    scene.detach();
    wallet.detach();
    alerts.detach();
    bus.cleanup();
    Ok(())
}
