//! Pairing: turn gateway device listings into initial device settings

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::device::registry::ThermostatRegistry;
use crate::device::settings::{ThermostatSettings, ValveSettings, DEFAULT_POLLING_INTERVAL_SECS};
use crate::easycontrol::client::EasyControlClient;
use crate::easycontrol::identity::DeviceIdentity;
use crate::easycontrol::models::DeviceResponse;
use crate::easycontrol::transport::Transport;
use crate::error::{BridgeError, Result};

pub const THERMOSTAT_TYPE: &str = "thermostat";
pub const VALVE_TYPE: &str = "thermostat_valve";

/// A device the user can add
#[derive(Debug, Clone, PartialEq)]
pub struct PairingCandidate<S> {
    pub name: String,
    pub device_id: u32,
    pub settings: S,
}

/// A registered thermostat offered as the parent of new valves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThermostatListing {
    pub name: String,
    pub serial_number: u64,
}

/// Decode a base64 device name. Names that are not valid base64 UTF-8 are
/// kept as sent.
pub fn decode_name(encoded: &str) -> String {
    match STANDARD.decode(encoded.trim()) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(name) => name,
            Err(_) => encoded.to_string(),
        },
        Err(e) => {
            tracing::warn!("[Pairing] Device name {:?} is not base64: {}", encoded, e);
            encoded.to_string()
        }
    }
}

pub fn thermostat_candidates(
    devices: &[DeviceResponse],
    identity: &DeviceIdentity,
) -> Vec<PairingCandidate<ThermostatSettings>> {
    devices
        .iter()
        .filter(|d| d.device_type == THERMOSTAT_TYPE)
        .map(|d| PairingCandidate {
            name: decode_name(&d.name),
            device_id: d.id,
            settings: ThermostatSettings {
                identity: identity.clone(),
                zone_id: d.zone,
                device_id: Some(d.id),
                polling_interval: Duration::from_secs(DEFAULT_POLLING_INTERVAL_SECS),
            },
        })
        .collect()
}

pub fn valve_candidates(
    devices: &[DeviceResponse],
    serial_number: u64,
) -> Vec<PairingCandidate<ValveSettings>> {
    devices
        .iter()
        .filter(|d| d.device_type == VALVE_TYPE)
        .map(|d| PairingCandidate {
            name: decode_name(&d.name),
            device_id: d.id,
            settings: ValveSettings {
                serial_number,
                zone_id: d.zone,
                device_id: d.id,
            },
        })
        .collect()
}

/// Validate gateway credentials and list the thermostats behind them. The
/// session is closed again before returning.
pub async fn discover_thermostats(
    transport: Arc<dyn Transport>,
    identity: &DeviceIdentity,
) -> Result<Vec<PairingCandidate<ThermostatSettings>>> {
    tracing::info!("[Pairing] Validating gateway {}", identity.masked_serial());

    let client = EasyControlClient::new(transport);
    client.connect(identity).await?;

    let devices = client.get_devices().await.unwrap_or_default();
    tracing::info!("[Pairing] Found {} device(s)", devices.len());

    client.disconnect().await;
    Ok(thermostat_candidates(&devices, identity))
}

/// Thermostats a new valve can be attached to
pub async fn list_thermostats(registry: &ThermostatRegistry) -> Result<Vec<ThermostatListing>> {
    let thermostats = registry.list().await;
    if thermostats.is_empty() {
        return Err(BridgeError::Pairing(
            "No thermostats found, please add one first!".into(),
        ));
    }

    Ok(thermostats
        .into_iter()
        .map(|(serial_number, name)| ThermostatListing {
            name,
            serial_number,
        })
        .collect())
}

/// Valves known to the gateway of a registered thermostat
pub async fn list_thermostat_valves(
    registry: &ThermostatRegistry,
    serial_number: u64,
) -> Result<Vec<PairingCandidate<ValveSettings>>> {
    let thermostat = registry
        .lookup(serial_number)
        .await
        .ok_or_else(|| BridgeError::Pairing("Thermostat not found".into()))?;

    let devices = thermostat.client().get_devices().await.unwrap_or_default();
    Ok(valve_candidates(&devices, serial_number))
}
