//! Radiator valve controller
//!
//! A valve owns no gateway session. It finds its thermostat in the topology
//! registry by gateway serial, links itself into the thermostat's valve list
//! and is refreshed by the thermostat after every poll, borrowing the
//! thermostat's client for reads and commands.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::device::capability::{
    self, battery_alarm, normalize_child_lock, Capability, CapabilityStore, CapabilityValue,
};
use crate::device::clock::Clock;
use crate::device::registry::ThermostatRegistry;
use crate::device::settings::{SettingsStore, ValveSettings};
use crate::device::thermostat::{ChildDevice, ThermostatController};
use crate::device::{check_ack, validate_temperature_offset};
use crate::easycontrol::identity::mask_serial;
use crate::error::{BridgeError, Result};

/// Registry lookups before a valve gives up on its thermostat
pub const DISCOVERY_ATTEMPTS: u32 = 5;

/// Pause between two registry lookups
pub const DISCOVERY_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValveState {
    Uninitialized,
    Discovering,
    Linked,
    Unlinked,
    Disposed,
}

pub struct ValveController {
    name: String,
    settings_store: Arc<dyn SettingsStore>,
    capabilities: Arc<dyn CapabilityStore>,
    registry: Arc<ThermostatRegistry>,
    clock: Arc<dyn Clock>,
    settings: RwLock<Option<ValveSettings>>,
    thermostat: RwLock<Weak<ThermostatController>>,
    state: Mutex<ValveState>,
    discovery_attempts: AtomicU32,
}

impl ValveController {
    pub fn new(
        name: impl Into<String>,
        settings_store: Arc<dyn SettingsStore>,
        capabilities: Arc<dyn CapabilityStore>,
        registry: Arc<ThermostatRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            settings_store,
            capabilities,
            registry,
            clock,
            settings: RwLock::new(None),
            thermostat: RwLock::new(Weak::new()),
            state: Mutex::new(ValveState::Uninitialized),
            discovery_attempts: AtomicU32::new(0),
        })
    }

    pub fn state(&self) -> ValveState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registry lookups made by the last discovery
    pub fn discovery_attempts(&self) -> u32 {
        self.discovery_attempts.load(Ordering::SeqCst)
    }

    /// Find the thermostat and link into its valve list. When the thermostat
    /// does not show up the valve stays unlinked until it is initialized again.
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        let settings = ValveSettings::from_raw(&self.settings_store.get_all().await)?;
        *self.settings.write().await = Some(settings.clone());

        self.set_state(ValveState::Discovering);
        tracing::info!(
            "[Valve] {}: looking for thermostat {}",
            self.name,
            mask_serial(settings.serial_number)
        );

        let thermostat = match self.discover(settings.serial_number).await {
            Some(thermostat) => thermostat,
            None => {
                self.set_state(ValveState::Unlinked);
                tracing::error!(
                    "[Valve] {}: thermostat {} not found after {} attempts, valve is inactive",
                    self.name,
                    mask_serial(settings.serial_number),
                    DISCOVERY_ATTEMPTS
                );
                return Err(BridgeError::DiscoveryFailed {
                    serial_number: mask_serial(settings.serial_number),
                    attempts: DISCOVERY_ATTEMPTS,
                });
            }
        };

        let handle: Arc<dyn ChildDevice> = self.clone();
        thermostat.register_valve(handle).await;
        *self.thermostat.write().await = Arc::downgrade(&thermostat);

        self.set_state(ValveState::Linked);
        tracing::info!(
            "[Valve] {} has been initialized under thermostat '{}'",
            self.name,
            thermostat.name()
        );
        Ok(())
    }

    async fn discover(&self, serial_number: u64) -> Option<Arc<ThermostatController>> {
        for attempt in 1..=DISCOVERY_ATTEMPTS {
            self.discovery_attempts.store(attempt, Ordering::SeqCst);

            match self.registry.lookup(serial_number).await {
                Some(thermostat) if !thermostat.is_disposed() => {
                    tracing::debug!("[Valve] {}: thermostat found on attempt {}", self.name, attempt);
                    return Some(thermostat);
                }
                _ => {}
            }

            if attempt < DISCOVERY_ATTEMPTS {
                tracing::debug!(
                    "[Valve] {}: thermostat not registered yet (attempt {}/{})",
                    self.name,
                    attempt,
                    DISCOVERY_ATTEMPTS
                );
                self.clock.sleep(DISCOVERY_DELAY).await;
            }
        }
        None
    }

    /// Called once the platform has finished pairing the valve
    pub async fn on_added(&self) {
        if let Some(thermostat) = self.linked_thermostat().await {
            thermostat.request_sync();
        }
    }

    /// Leave the thermostat's valve list. No-op when never linked.
    pub async fn dispose(self: &Arc<Self>) {
        let thermostat = {
            let mut link = self.thermostat.write().await;
            std::mem::take(&mut *link).upgrade()
        };

        if let Some(thermostat) = thermostat {
            let handle: Arc<dyn ChildDevice> = self.clone();
            thermostat.remove_valve(&handle).await;
        }

        if self.state() != ValveState::Disposed {
            self.set_state(ValveState::Disposed);
            tracing::info!("[Valve] {} has been deleted", self.name);
        }
    }

    async fn linked_thermostat(&self) -> Option<Arc<ThermostatController>> {
        match self.thermostat.read().await.upgrade() {
            Some(thermostat) if !thermostat.is_disposed() => Some(thermostat),
            _ => {
                if self.state() == ValveState::Linked {
                    self.set_state(ValveState::Unlinked);
                    tracing::warn!("[Valve] {}: thermostat is gone", self.name);
                }
                None
            }
        }
    }

    async fn current_settings(&self) -> Result<ValveSettings> {
        match ValveSettings::from_raw(&self.settings_store.get_all().await) {
            Ok(settings) => {
                *self.settings.write().await = Some(settings.clone());
                Ok(settings)
            }
            Err(e) => self.settings.read().await.clone().ok_or(e),
        }
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Read the valve's endpoints through the thermostat's client and publish
    /// them. Does nothing while unlinked.
    pub async fn set_valve_data(&self) -> Result<()> {
        let Some(thermostat) = self.linked_thermostat().await else {
            return Ok(());
        };
        let settings = self.current_settings().await?;
        let client = thermostat.client();
        let (zone_id, device_id) = (settings.zone_id, settings.device_id);

        let temperature = client.get_zone_temperature(zone_id).await;
        let target_temperature = client.get_zone_target_temperature(zone_id).await;
        let battery = client.get_device_battery(device_id).await;
        let signal = client.get_device_signal(device_id).await;
        let valve_position = client.get_device_valve_position(device_id).await;
        let temperature_offset = client.get_device_temperature_offset(device_id).await;
        let child_lock = client.get_device_child_lock(device_id).await;

        if let Some(resp) = temperature {
            tracing::debug!("[Valve] {} → temperature: {}{}", self.name, resp.value, resp.unit());
            self.publish(Capability::MeasureTemperature, resp.value).await;
        }

        if let Some(resp) = target_temperature {
            tracing::debug!(
                "[Valve] {} → target temperature: {}{}",
                self.name,
                resp.value,
                resp.unit()
            );
            self.publish(Capability::TargetTemperature, resp.value).await;
        }

        if let Some(resp) = battery {
            tracing::debug!("[Valve] {} → battery: {}", self.name, resp.value);
            self.publish(Capability::AlarmBattery, battery_alarm(&resp.value))
                .await;
        }

        if let Some(resp) = signal {
            tracing::debug!("[Valve] {} → signal: {}{}", self.name, resp.value, resp.unit());
            self.publish(Capability::ValveSignalStrength, resp.value).await;
        }

        if let Some(resp) = valve_position {
            tracing::debug!("[Valve] {} → valve position: {}{}", self.name, resp.value, resp.unit());
            self.publish(Capability::ValvePosition, resp.value).await;
        }

        if let Some(resp) = temperature_offset {
            tracing::debug!(
                "[Valve] {} → temperature offset: {}{}",
                self.name,
                resp.value,
                resp.unit()
            );
            self.publish(Capability::TemperatureOffset, resp.value).await;
        }

        if let Some(resp) = child_lock {
            tracing::debug!("[Valve] {} → child lock: {}", self.name, resp.value);
            self.publish_child_lock(&resp.value).await;
        }

        Ok(())
    }

    async fn publish_child_lock(&self, value: &Value) {
        match normalize_child_lock(value) {
            Some(locked) => self.publish(Capability::ChildLock, locked).await,
            None => tracing::warn!(
                "[Valve] {}: unexpected child lock value {}, skipping",
                self.name,
                value
            ),
        }
    }

    async fn publish(&self, capability: Capability, value: impl Into<CapabilityValue>) {
        capability::publish(self.capabilities.as_ref(), &self.name, capability, value).await;
    }

    // ========================================================================
    // Commands
    // ========================================================================

    pub async fn set_target_temperature(&self, temperature: f64) -> Result<()> {
        let Some(thermostat) = self.linked_thermostat().await else {
            tracing::debug!("[Valve] {}: no thermostat, ignoring target temperature", self.name);
            return Ok(());
        };
        let settings = self.current_settings().await?;
        tracing::info!("[Valve] {}: setting target temperature to {}", self.name, temperature);

        let ack = thermostat
            .client()
            .set_zone_target_temperature(settings.zone_id, temperature)
            .await;
        check_ack(ack, "target temperature")?;

        self.publish(Capability::TargetTemperature, temperature).await;
        Ok(())
    }

    pub async fn set_temperature_offset(&self, offset: f64) -> Result<()> {
        validate_temperature_offset(offset)?;

        let Some(thermostat) = self.linked_thermostat().await else {
            tracing::debug!("[Valve] {}: no thermostat, ignoring temperature offset", self.name);
            return Ok(());
        };
        let settings = self.current_settings().await?;
        tracing::info!("[Valve] {}: setting temperature offset to {}", self.name, offset);

        let ack = thermostat
            .client()
            .set_device_temperature_offset(settings.device_id, offset)
            .await;
        check_ack(ack, "temperature offset")?;

        self.publish(Capability::TemperatureOffset, offset).await;
        Ok(())
    }

    pub async fn set_child_lock(&self, enabled: bool) -> Result<()> {
        let Some(thermostat) = self.linked_thermostat().await else {
            tracing::debug!("[Valve] {}: no thermostat, ignoring child lock", self.name);
            return Ok(());
        };
        let settings = self.current_settings().await?;
        tracing::info!("[Valve] {}: setting child lock to {}", self.name, enabled);

        let ack = thermostat
            .client()
            .set_device_child_lock(settings.device_id, enabled)
            .await;
        check_ack(ack, "child lock status")?;

        self.publish(Capability::ChildLock, enabled).await;
        Ok(())
    }

    /// Last known child lock state
    pub async fn child_lock(&self) -> Option<bool> {
        match self.capabilities.get_value(Capability::ChildLock).await {
            Some(CapabilityValue::Bool(locked)) => Some(locked),
            _ => None,
        }
    }

    fn set_state(&self, next: ValveState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

#[async_trait]
impl ChildDevice for ValveController {
    fn name(&self) -> &str {
        &self.name
    }

    async fn refresh(&self) -> Result<()> {
        self.set_valve_data().await
    }
}
