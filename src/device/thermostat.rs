//! Thermostat controller
//!
//! Owns the gateway session of one EasyControl thermostat. Every polling
//! interval it reads the monitored endpoints, publishes the values as
//! capabilities and then refreshes each linked valve in turn over the same
//! session. Valves never poll on their own.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::device::capability::{
    self, bar_to_millibar, normalize_child_lock, Capability, CapabilityStore, CapabilityValue,
};
use crate::device::registry::ThermostatRegistry;
use crate::device::scheduler::SyncScheduler;
use crate::device::settings::{
    polling_interval, RawSettings, SettingsStore, ThermostatSettings, POLLING_INTERVAL,
};
use crate::device::{check_ack, validate_temperature_offset};
use crate::easycontrol::client::EasyControlClient;
use crate::easycontrol::transport::Transport;
use crate::error::{BridgeError, Result};

/// A device refreshed by its thermostat after each poll
#[async_trait]
pub trait ChildDevice: Send + Sync {
    fn name(&self) -> &str;

    async fn refresh(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermostatState {
    Uninitialized,
    Connecting,
    Idle,
    Syncing,
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Uninitialized,
    Connecting,
    Running,
    Disposed,
}

pub struct ThermostatController {
    name: String,
    client: EasyControlClient,
    settings_store: Arc<dyn SettingsStore>,
    capabilities: Arc<dyn CapabilityStore>,
    registry: Arc<ThermostatRegistry>,
    scheduler: Arc<SyncScheduler>,
    settings: RwLock<Option<ThermostatSettings>>,
    valves: RwLock<Vec<Arc<dyn ChildDevice>>>,
    lifecycle: Mutex<Lifecycle>,
    last_synced_at: RwLock<Option<DateTime<Utc>>>,
}

impl ThermostatController {
    pub fn new(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        settings_store: Arc<dyn SettingsStore>,
        capabilities: Arc<dyn CapabilityStore>,
        registry: Arc<ThermostatRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            client: EasyControlClient::new(transport),
            settings_store,
            capabilities,
            registry,
            scheduler: Arc::new(SyncScheduler::new()),
            settings: RwLock::new(None),
            valves: RwLock::new(Vec::new()),
            lifecycle: Mutex::new(Lifecycle::Uninitialized),
            last_synced_at: RwLock::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gateway client shared with the linked valves
    pub fn client(&self) -> &EasyControlClient {
        &self.client
    }

    pub fn state(&self) -> ThermostatState {
        match self.lifecycle() {
            Lifecycle::Uninitialized => ThermostatState::Uninitialized,
            Lifecycle::Connecting => ThermostatState::Connecting,
            Lifecycle::Disposed => ThermostatState::Disposed,
            Lifecycle::Running if self.scheduler.is_syncing() => ThermostatState::Syncing,
            Lifecycle::Running => ThermostatState::Idle,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.lifecycle() == Lifecycle::Disposed
    }

    pub fn completed_cycles(&self) -> u64 {
        self.scheduler.completed_cycles()
    }

    /// Time left until the next scheduled cycle
    pub fn next_sync_in(&self) -> Option<Duration> {
        self.scheduler.next_due_in()
    }

    pub async fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        *self.last_synced_at.read().await
    }

    /// Settings snapshot taken at the start of the last cycle
    pub async fn settings(&self) -> Option<ThermostatSettings> {
        self.settings.read().await.clone()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Connect, register under the gateway serial, make sure every required
    /// capability exists and run the first cycle. A failed connection is
    /// logged and leaves the controller polling a disconnected client.
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        let raw = self.settings_store.get_all().await;
        let settings = ThermostatSettings::from_raw(&raw)?;
        let serial_number = settings.identity.serial_number;

        self.set_lifecycle(Lifecycle::Connecting);
        tracing::info!(
            "[Thermostat] {}: initializing gateway {}",
            self.name,
            settings.identity.masked_serial()
        );

        *self.settings.write().await = Some(settings.clone());

        if let Err(e) = self.client.connect(&settings.identity).await {
            tracing::error!("[Thermostat] {}: {}", self.name, e);
        }

        self.registry
            .register(serial_number, self.name.clone(), Arc::clone(self))
            .await;

        self.ensure_capabilities().await;

        self.set_lifecycle(Lifecycle::Running);
        self.scheduler.resume();
        tracing::info!("[Thermostat] {} has been initialized", self.name);

        self.sync().await;
        Ok(())
    }

    async fn ensure_capabilities(&self) {
        for capability in Capability::THERMOSTAT_REQUIRED {
            if self.capabilities.has_capability(capability).await {
                continue;
            }

            match self.capabilities.add_capability(capability).await {
                Ok(()) => tracing::info!("[Thermostat] {}: added capability {}", self.name, capability),
                Err(e) => tracing::error!(
                    "[Thermostat] {}: failed to add capability {}: {}",
                    self.name,
                    capability,
                    e
                ),
            }
        }
    }

    /// Stop polling, leave the registry and close the session. Safe to call
    /// more than once.
    pub async fn dispose(self: &Arc<Self>) {
        self.scheduler.stop();

        let serial_number = self
            .settings
            .read()
            .await
            .as_ref()
            .map(|s| s.identity.serial_number);
        if let Some(serial_number) = serial_number {
            let me = Arc::clone(self);
            self.registry
                .unregister_if(serial_number, move |current| Arc::ptr_eq(current, &me))
                .await;
        }

        self.valves.write().await.clear();
        self.client.disconnect().await;

        if self.lifecycle() != Lifecycle::Disposed {
            self.set_lifecycle(Lifecycle::Disposed);
            tracing::info!("[Thermostat] {} has been deleted", self.name);
        }
    }

    // ========================================================================
    // Synchronization
    // ========================================================================

    /// Run one cycle. Resolves to false when the cycle was skipped because
    /// polling is stopped or another cycle is still running.
    pub fn sync(self: &Arc<Self>) -> BoxFuture<'static, bool> {
        let this = Arc::clone(self);
        async move {
            if !this.scheduler.try_begin() {
                tracing::debug!("[Thermostat] {}: sync skipped", this.name);
                return false;
            }

            tracing::debug!("[Thermostat] {}: syncing data...", this.name);

            if let Some(settings) = this.reload_settings().await {
                this.set_thermostat_data(&settings).await;
            }
            this.refresh_valves().await;

            *this.last_synced_at.write().await = Some(Utc::now());
            this.scheduler.finish();
            tracing::debug!("[Thermostat] {}: data synced", this.name);

            if this.scheduler.should_sync() {
                let interval = polling_interval(&this.settings_store.get_all().await);
                this.schedule_next_sync(interval);
            }
            true
        }
        .boxed()
    }

    /// Move the next cycle forward to now. Used right after a valve is paired.
    pub fn request_sync(self: &Arc<Self>) {
        if !self.scheduler.should_sync() {
            return;
        }
        tracing::debug!("[Thermostat] {}: immediate sync requested", self.name);
        self.schedule_next_sync(Duration::ZERO);
    }

    fn schedule_next_sync(self: &Arc<Self>, delay: Duration) {
        let this = Arc::clone(self);
        if self.scheduler.arm(delay, move || this.sync()) {
            tracing::debug!(
                "[Thermostat] {}: next sync in {}ms",
                self.name,
                delay.as_millis()
            );
        } else {
            tracing::debug!("[Thermostat] {}: polling stopped, not rescheduling", self.name);
        }
    }

    async fn reload_settings(&self) -> Option<ThermostatSettings> {
        let raw = self.settings_store.get_all().await;
        match ThermostatSettings::from_raw(&raw) {
            Ok(settings) => {
                *self.settings.write().await = Some(settings.clone());
                Some(settings)
            }
            Err(e) => {
                tracing::warn!(
                    "[Thermostat] {}: keeping previous settings: {}",
                    self.name,
                    e
                );
                self.settings.read().await.clone()
            }
        }
    }

    async fn set_thermostat_data(&self, settings: &ThermostatSettings) {
        let client = &self.client;
        let zone_id = settings.zone_id;

        let temperature = client.get_zone_temperature(zone_id).await;
        let target_temperature = client.get_zone_target_temperature(zone_id).await;
        let humidity = client.get_zone_humidity(zone_id).await;
        let pressure = client.get_appliance_system_pressure().await;
        let signal_strength = client.get_wifi_signal_strength().await;
        let return_temperature = client.get_heat_sources_return_temperature().await;
        let modulation = client.get_heat_sources_actual_modulation().await;
        let child_lock = match settings.device_id {
            Some(device_id) => client.get_device_thermostat_child_lock(device_id).await,
            None => None,
        };
        let outside_temperature = client.get_outside_temperature().await;
        let temperature_offset = client.get_system_temperature_offset().await;

        if let Some(resp) = temperature {
            tracing::debug!("[Thermostat] {} → temperature: {}{}", self.name, resp.value, resp.unit());
            self.publish(Capability::MeasureTemperature, resp.value).await;
        }

        if let Some(resp) = target_temperature {
            tracing::debug!(
                "[Thermostat] {} → target temperature: {}{}",
                self.name,
                resp.value,
                resp.unit()
            );
            self.publish(Capability::TargetTemperature, resp.value).await;
        }

        if let Some(resp) = humidity {
            tracing::debug!("[Thermostat] {} → humidity: {}{}", self.name, resp.value, resp.unit());
            self.publish(Capability::MeasureHumidity, resp.value).await;
        }

        if let Some(resp) = pressure {
            tracing::debug!("[Thermostat] {} → pressure: {}{}", self.name, resp.value, resp.unit());
            self.publish(Capability::MeasurePressure, bar_to_millibar(resp.value))
                .await;
        }

        if let Some(resp) = signal_strength {
            tracing::debug!("[Thermostat] {} → wifi signal: {}{}", self.name, resp.value, resp.unit());
            self.publish(Capability::MeasureSignalStrength, resp.value).await;
        }

        if let Some(resp) = return_temperature {
            tracing::debug!(
                "[Thermostat] {} → return temperature: {}{}",
                self.name,
                resp.value,
                resp.unit()
            );
            self.publish(Capability::ReturnTemperature, resp.value).await;
        }

        if let Some(resp) = modulation {
            tracing::debug!("[Thermostat] {} → modulation: {}{}", self.name, resp.value, resp.unit());
            self.publish(Capability::ActualModulation, resp.value).await;
        }

        if let Some(resp) = child_lock {
            tracing::debug!("[Thermostat] {} → child lock: {}", self.name, resp.value);
            self.publish_child_lock(&resp.value).await;
        }

        if let Some(resp) = outside_temperature {
            tracing::debug!(
                "[Thermostat] {} → outside temperature: {}{}",
                self.name,
                resp.value,
                resp.unit()
            );
            self.publish(Capability::OutsideTemperature, resp.value).await;
        }

        if let Some(resp) = temperature_offset {
            tracing::debug!(
                "[Thermostat] {} → temperature offset: {}{}",
                self.name,
                resp.value,
                resp.unit()
            );
            self.publish(Capability::TemperatureOffset, resp.value).await;
        }
    }

    async fn publish_child_lock(&self, value: &Value) {
        match normalize_child_lock(value) {
            Some(locked) => self.publish(Capability::ChildLock, locked).await,
            None => tracing::warn!(
                "[Thermostat] {}: unexpected child lock value {}, skipping",
                self.name,
                value
            ),
        }
    }

    /// Refresh each valve in turn. A failing or panicking valve is logged and
    /// the rest still run.
    async fn refresh_valves(&self) {
        let valves: Vec<Arc<dyn ChildDevice>> = self.valves.read().await.clone();

        for valve in valves {
            tracing::debug!("[Thermostat] {}: syncing valve '{}'", self.name, valve.name());

            match AssertUnwindSafe(valve.refresh()).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(
                    "[Thermostat] {}: failed to sync valve '{}': {}",
                    self.name,
                    valve.name(),
                    e
                ),
                Err(_) => tracing::error!(
                    "[Thermostat] {}: valve '{}' panicked during sync",
                    self.name,
                    valve.name()
                ),
            }
        }
    }

    async fn publish(&self, capability: Capability, value: impl Into<CapabilityValue>) {
        capability::publish(self.capabilities.as_ref(), &self.name, capability, value).await;
    }

    // ========================================================================
    // Valves
    // ========================================================================

    /// Link a valve. Returns false when it is already linked.
    pub async fn register_valve(&self, valve: Arc<dyn ChildDevice>) -> bool {
        let mut valves = self.valves.write().await;
        if valves.iter().any(|v| same_device(v, &valve)) {
            return false;
        }
        tracing::info!("[Thermostat] {}: linked valve '{}'", self.name, valve.name());
        valves.push(valve);
        true
    }

    /// Unlink a valve. Unknown valves are ignored.
    pub async fn remove_valve(&self, valve: &Arc<dyn ChildDevice>) -> bool {
        let mut valves = self.valves.write().await;
        let before = valves.len();
        valves.retain(|v| !same_device(v, valve));
        let removed = valves.len() != before;
        if removed {
            tracing::info!("[Thermostat] {}: unlinked valve '{}'", self.name, valve.name());
        }
        removed
    }

    pub async fn valve_count(&self) -> usize {
        self.valves.read().await.len()
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Validate and persist a settings change. Returns the keys whose value
    /// changed; a new polling interval re-arms the pending timer.
    pub async fn apply_settings(self: &Arc<Self>, changes: RawSettings) -> Result<Vec<String>> {
        let mut merged = self.settings_store.get_all().await;
        let mut changed = Vec::new();

        for (key, value) in &changes {
            if merged.get(key) != Some(value) {
                changed.push(key.clone());
            }
            merged.insert(key.clone(), value.clone());
        }

        ThermostatSettings::from_raw(&merged)?;

        for key in &changed {
            if let Some(value) = changes.get(key) {
                self.settings_store.set(key, value.clone()).await?;
            }
        }

        if changed.iter().any(|k| k == POLLING_INTERVAL) {
            let interval = polling_interval(&merged);
            tracing::info!(
                "[Thermostat] {}: polling interval changed, resetting timeout to {}s",
                self.name,
                interval.as_secs()
            );

            if self.scheduler.should_sync() {
                self.schedule_next_sync(interval);
            }
        }

        Ok(changed)
    }

    // ========================================================================
    // Commands
    // ========================================================================

    pub async fn set_target_temperature(&self, temperature: f64) -> Result<()> {
        let settings = self.current_settings().await?;
        tracing::info!("[Thermostat] {}: setting target temperature to {}", self.name, temperature);

        let ack = self
            .client
            .set_zone_target_temperature(settings.zone_id, temperature)
            .await;
        check_ack(ack, "target temperature")?;

        self.publish(Capability::TargetTemperature, temperature).await;
        Ok(())
    }

    pub async fn set_temperature_offset(&self, offset: f64) -> Result<()> {
        validate_temperature_offset(offset)?;
        tracing::info!("[Thermostat] {}: setting temperature offset to {}", self.name, offset);

        let ack = self.client.set_system_temperature_offset(offset).await;
        check_ack(ack, "temperature offset")?;

        self.publish(Capability::TemperatureOffset, offset).await;
        Ok(())
    }

    pub async fn set_child_lock(&self, enabled: bool) -> Result<()> {
        let settings = self.current_settings().await?;
        let device_id = settings.device_id.ok_or_else(|| {
            BridgeError::InvalidSettings("deviceId is required for the child lock".into())
        })?;
        tracing::info!("[Thermostat] {}: setting child lock to {}", self.name, enabled);

        let ack = self
            .client
            .set_device_thermostat_child_lock(device_id, enabled)
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

    async fn current_settings(&self) -> Result<ThermostatSettings> {
        self.settings
            .read()
            .await
            .clone()
            .ok_or_else(|| BridgeError::InvalidSettings("thermostat is not initialized".into()))
    }

    fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_lifecycle(&self, next: Lifecycle) {
        *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

fn same_device(a: &Arc<dyn ChildDevice>, b: &Arc<dyn ChildDevice>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
