//! EasyControl gateway client
//!
//! Typed reads and writes over the endpoint catalog. Failures never leave
//! this layer: every call yields `None` when the session is down, the
//! transport fails, or the response lacks the expected fields. Callers treat
//! a missing value as a gap to fill on the next poll.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::easycontrol::endpoint::Endpoint;
use crate::easycontrol::identity::DeviceIdentity;
use crate::easycontrol::models::{DeviceResponse, PutResponse, ValueResponse, ZoneResponse};
use crate::easycontrol::transport::{Transport, TransportError};
use crate::error::{BridgeError, Result};

pub struct EasyControlClient {
    transport: Arc<dyn Transport>,
    connected: AtomicBool,
}

impl EasyControlClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            connected: AtomicBool::new(false),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Open the gateway session. On failure the client stays usable and
    /// every later call reports "not connected".
    pub async fn connect(&self, identity: &DeviceIdentity) -> Result<()> {
        match self.transport.connect(identity).await {
            Ok(()) => {
                self.connected.store(true, Ordering::SeqCst);
                tracing::info!(
                    "[EasyControl] Connected to gateway {}",
                    identity.masked_serial()
                );
                Ok(())
            }
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                Err(BridgeError::ConnectionFailed(e.message))
            }
        }
    }

    pub async fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Err(e) = self.transport.disconnect().await {
            tracing::warn!("[EasyControl] Disconnect failed: {}", e);
        }
    }

    // ========================================================================
    // Listings
    // ========================================================================

    pub async fn get_devices(&self) -> Option<Vec<DeviceResponse>> {
        self.get::<Vec<DeviceResponse>>(&Endpoint::Devices.path())
            .await
            .map(|r| r.value)
    }

    pub async fn get_zones(&self) -> Option<Vec<ZoneResponse>> {
        self.get::<Vec<ZoneResponse>>(&Endpoint::Zones.path())
            .await
            .map(|r| r.value)
    }

    // ========================================================================
    // Zones
    // ========================================================================

    pub async fn get_zone_temperature(&self, zone_id: u32) -> Option<ValueResponse<f64>> {
        self.get(&Endpoint::ZoneTemperature.with_id(zone_id)).await
    }

    pub async fn get_zone_target_temperature(&self, zone_id: u32) -> Option<ValueResponse<f64>> {
        self.get(&Endpoint::ZoneTargetTemperature.with_id(zone_id))
            .await
    }

    pub async fn set_zone_target_temperature(
        &self,
        zone_id: u32,
        temperature: f64,
    ) -> Option<PutResponse> {
        self.set(
            &Endpoint::ZoneManualTemperatureHeating.with_id(zone_id),
            temperature,
        )
        .await
    }

    pub async fn get_zone_humidity(&self, zone_id: u32) -> Option<ValueResponse<f64>> {
        self.get(&Endpoint::ZoneHumidity.with_id(zone_id)).await
    }

    pub async fn get_zone_valve_position(&self, zone_id: u32) -> Option<ValueResponse<f64>> {
        self.get(&Endpoint::ZoneValvePosition.with_id(zone_id)).await
    }

    // ========================================================================
    // System and gateway
    // ========================================================================

    pub async fn get_appliance_system_pressure(&self) -> Option<ValueResponse<f64>> {
        self.get(&Endpoint::ApplianceSystemPressure.path()).await
    }

    pub async fn get_wifi_signal_strength(&self) -> Option<ValueResponse<f64>> {
        self.get(&Endpoint::GatewayWifiRssi.path()).await
    }

    pub async fn get_heat_sources_return_temperature(&self) -> Option<ValueResponse<f64>> {
        self.get(&Endpoint::HeatSourcesReturnTemperature.path())
            .await
    }

    pub async fn get_heat_sources_actual_modulation(&self) -> Option<ValueResponse<f64>> {
        self.get(&Endpoint::HeatSourcesActualModulation.path())
            .await
    }

    pub async fn get_outside_temperature(&self) -> Option<ValueResponse<f64>> {
        self.get(&Endpoint::SystemOutsideTemperature.path()).await
    }

    pub async fn get_system_temperature_offset(&self) -> Option<ValueResponse<f64>> {
        self.get(&Endpoint::SystemTemperatureOffset.path()).await
    }

    pub async fn set_system_temperature_offset(&self, offset: f64) -> Option<PutResponse> {
        self.set(&Endpoint::SystemTemperatureOffset.path(), offset)
            .await
    }

    // ========================================================================
    // Devices
    // ========================================================================

    pub async fn get_device_battery(&self, device_id: u32) -> Option<ValueResponse<String>> {
        self.get(&Endpoint::DeviceBattery.with_id(device_id)).await
    }

    pub async fn get_device_signal(&self, device_id: u32) -> Option<ValueResponse<f64>> {
        self.get(&Endpoint::DeviceSignal.with_id(device_id)).await
    }

    pub async fn get_device_valve_position(&self, device_id: u32) -> Option<ValueResponse<f64>> {
        self.get(&Endpoint::DeviceValvePosition.with_id(device_id))
            .await
    }

    pub async fn get_device_temperature_offset(
        &self,
        device_id: u32,
    ) -> Option<ValueResponse<f64>> {
        self.get(&Endpoint::DeviceTemperatureOffset.with_id(device_id))
            .await
    }

    pub async fn set_device_temperature_offset(
        &self,
        device_id: u32,
        offset: f64,
    ) -> Option<PutResponse> {
        self.set(&Endpoint::DeviceTemperatureOffset.with_id(device_id), offset)
            .await
    }

    /// Child lock status; the gateway reports it as text or as a boolean
    pub async fn get_device_child_lock(&self, device_id: u32) -> Option<ValueResponse<Value>> {
        self.get(&Endpoint::DeviceChildLockEnabled.with_id(device_id))
            .await
    }

    pub async fn set_device_child_lock(&self, device_id: u32, enabled: bool) -> Option<PutResponse> {
        self.set(
            &Endpoint::DeviceChildLockEnabled.with_id(device_id),
            lock_payload(enabled),
        )
        .await
    }

    pub async fn get_device_thermostat_child_lock(
        &self,
        device_id: u32,
    ) -> Option<ValueResponse<Value>> {
        self.get(&Endpoint::DeviceThermostatChildLockEnabled.with_id(device_id))
            .await
    }

    pub async fn set_device_thermostat_child_lock(
        &self,
        device_id: u32,
        enabled: bool,
    ) -> Option<PutResponse> {
        self.set(
            &Endpoint::DeviceThermostatChildLockEnabled.with_id(device_id),
            lock_payload(enabled),
        )
        .await
    }

    // ========================================================================
    // Raw access
    // ========================================================================

    /// Read a resolved path and decode it as a value response
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Option<ValueResponse<T>> {
        if !self.is_connected() {
            tracing::debug!("[EasyControl] Skipping read of {}: client is not connected", path);
            return None;
        }

        let raw = match self.transport.get(path).await {
            Ok(raw) => raw,
            Err(e) => {
                Self::report_error(path, &e);
                return None;
            }
        };

        match serde_json::from_value::<ValueResponse<T>>(raw) {
            Ok(resp) => Some(resp),
            Err(e) => {
                tracing::warn!("[EasyControl] Unexpected response for {}: {}", path, e);
                None
            }
        }
    }

    /// Write to a resolved path; the payload is wrapped as `{"value": ...}`
    pub async fn set<V: Serialize>(&self, path: &str, value: V) -> Option<PutResponse> {
        if !self.is_connected() {
            tracing::error!("[EasyControl] Unable to set value. Reason: Client is not connected!");
            return None;
        }

        let body = serde_json::json!({ "value": value });

        let raw = match self.transport.put(path, body).await {
            Ok(raw) => raw,
            Err(e) => {
                Self::report_error(path, &e);
                return None;
            }
        };

        match serde_json::from_value::<PutResponse>(raw) {
            Ok(resp) => Some(resp),
            Err(e) => {
                tracing::warn!("[EasyControl] Unexpected acknowledgement for {}: {}", path, e);
                None
            }
        }
    }

    fn report_error(path: &str, error: &TransportError) {
        if error.is_rate_limited() {
            tracing::warn!("[EasyControl] Spawning too many requests! ({})", path);
        } else {
            tracing::error!("[EasyControl] Request {} failed: {:?}", path, error);
        }
    }
}

fn lock_payload(enabled: bool) -> &'static str {
    if enabled {
        "true"
    } else {
        "false"
    }
}
