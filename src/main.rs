//! easycontrol-bridge - EasyControl thermostat bridge
//!
//! Polls EasyControl thermostats and their radiator valves through an HTTP
//! relay and keeps the device capabilities current.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use easycontrol_bridge::config::Config;
use easycontrol_bridge::device::capability::{Capability, MemoryCapabilityStore};
use easycontrol_bridge::device::clock::TokioClock;
use easycontrol_bridge::device::settings::MemorySettingsStore;
use easycontrol_bridge::device::{ThermostatController, ThermostatRegistry, ValveController};
use easycontrol_bridge::easycontrol::HttpTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "easycontrol_bridge=info".into()),
        )
        .init();

    tracing::info!("Starting easycontrol-bridge...");

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        "Configuration loaded: {} thermostat(s), {} valve(s), relay {}",
        config.thermostats.len(),
        config.valves.len(),
        config.relay.base_url
    );

    let registry = Arc::new(ThermostatRegistry::new());

    // Thermostats first so valves can find them
    let mut thermostats = Vec::new();
    for device in &config.thermostats {
        let transport = Arc::new(HttpTransport::new(&config.relay)?);
        let controller = ThermostatController::new(
            device.name.clone(),
            transport,
            Arc::new(MemorySettingsStore::new(device.to_settings())),
            Arc::new(MemoryCapabilityStore::new(
                device.name.clone(),
                &Capability::THERMOSTAT_MANIFEST,
            )),
            registry.clone(),
        );

        match controller.initialize().await {
            Ok(()) => thermostats.push(controller),
            Err(e) => tracing::error!("Thermostat '{}' failed to start: {}", device.name, e),
        }
    }

    let clock = Arc::new(TokioClock);
    let mut valves = Vec::new();
    for device in &config.valves {
        let controller = ValveController::new(
            device.name.clone(),
            Arc::new(MemorySettingsStore::new(device.to_settings())),
            Arc::new(MemoryCapabilityStore::new(
                device.name.clone(),
                &Capability::VALVE_MANIFEST,
            )),
            registry.clone(),
            clock.clone(),
        );

        // A valve without a thermostat stays inactive but is still disposed below
        if let Err(e) = controller.initialize().await {
            tracing::error!("Valve '{}' failed to start: {}", device.name, e);
        }
        valves.push(controller);
    }

    tracing::info!(
        "Bridge running with {} thermostat(s) and {} valve(s)",
        thermostats.len(),
        valves.len()
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    for valve in &valves {
        valve.dispose().await;
    }
    for thermostat in &thermostats {
        thermostat.dispose().await;
    }

    let stale = registry.dispose().await;
    if stale > 0 {
        tracing::warn!("Registry still held {} thermostat(s) at shutdown", stale);
    }

    Ok(())
}
