//! Capability identifiers, values and the capability store boundary

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{BridgeError, Result};

/// Capabilities the bridge publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "measure_temperature")]
    MeasureTemperature,
    #[serde(rename = "target_temperature")]
    TargetTemperature,
    #[serde(rename = "measure_humidity")]
    MeasureHumidity,
    #[serde(rename = "measure_pressure")]
    MeasurePressure,
    #[serde(rename = "measure_signal_strength")]
    MeasureSignalStrength,
    #[serde(rename = "ec_measure_return_temperature")]
    ReturnTemperature,
    #[serde(rename = "ec_measure_actual_modulation")]
    ActualModulation,
    #[serde(rename = "ec_child_lock")]
    ChildLock,
    #[serde(rename = "ec_measure_outside_temperature")]
    OutsideTemperature,
    #[serde(rename = "ec_temperature_offset")]
    TemperatureOffset,
    #[serde(rename = "alarm_battery")]
    AlarmBattery,
    #[serde(rename = "ec_measure_valve_signal_strength")]
    ValveSignalStrength,
    #[serde(rename = "ec_valve_position")]
    ValvePosition,
}

impl Capability {
    /// Capabilities a thermostat declares when it is paired
    pub const THERMOSTAT_MANIFEST: [Capability; 5] = [
        Capability::MeasureTemperature,
        Capability::TargetTemperature,
        Capability::MeasureHumidity,
        Capability::MeasurePressure,
        Capability::MeasureSignalStrength,
    ];

    /// Slots added to thermostats paired before these existed
    pub const THERMOSTAT_REQUIRED: [Capability; 5] = [
        Capability::ReturnTemperature,
        Capability::ActualModulation,
        Capability::ChildLock,
        Capability::OutsideTemperature,
        Capability::TemperatureOffset,
    ];

    pub const VALVE_MANIFEST: [Capability; 7] = [
        Capability::MeasureTemperature,
        Capability::TargetTemperature,
        Capability::AlarmBattery,
        Capability::ValveSignalStrength,
        Capability::ValvePosition,
        Capability::TemperatureOffset,
        Capability::ChildLock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::MeasureTemperature => "measure_temperature",
            Capability::TargetTemperature => "target_temperature",
            Capability::MeasureHumidity => "measure_humidity",
            Capability::MeasurePressure => "measure_pressure",
            Capability::MeasureSignalStrength => "measure_signal_strength",
            Capability::ReturnTemperature => "ec_measure_return_temperature",
            Capability::ActualModulation => "ec_measure_actual_modulation",
            Capability::ChildLock => "ec_child_lock",
            Capability::OutsideTemperature => "ec_measure_outside_temperature",
            Capability::TemperatureOffset => "ec_temperature_offset",
            Capability::AlarmBattery => "alarm_battery",
            Capability::ValveSignalStrength => "ec_measure_valve_signal_strength",
            Capability::ValvePosition => "ec_valve_position",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CapabilityValue {
    Bool(bool),
    Number(f64),
}

impl From<bool> for CapabilityValue {
    fn from(v: bool) -> Self {
        CapabilityValue::Bool(v)
    }
}

impl From<f64> for CapabilityValue {
    fn from(v: f64) -> Self {
        CapabilityValue::Number(v)
    }
}

impl fmt::Display for CapabilityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityValue::Bool(v) => write!(f, "{}", v),
            CapabilityValue::Number(v) => write!(f, "{}", v),
        }
    }
}

/// Convert a pressure reading from bar to millibar, rounded to a thousandth
/// of a millibar so decimal readings map to the decimal result
pub fn bar_to_millibar(bar: f64) -> f64 {
    (bar * 1_000_000.0).round() / 1000.0
}

/// Normalize a child lock reading. Booleans pass through, text is matched
/// case-insensitively against `true`/`false`; anything else is unusable.
pub fn normalize_child_lock(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

/// Battery alarm is raised for any status other than `ok`
pub fn battery_alarm(status: &str) -> bool {
    !status.eq_ignore_ascii_case("ok")
}

/// Capability storage of the home-automation platform
#[async_trait]
pub trait CapabilityStore: Send + Sync {
    async fn set_value(&self, capability: Capability, value: CapabilityValue) -> Result<()>;

    async fn get_value(&self, capability: Capability) -> Option<CapabilityValue>;

    async fn has_capability(&self, capability: Capability) -> bool;

    async fn add_capability(&self, capability: Capability) -> Result<()>;
}

/// Write a capability value, logging instead of failing
pub async fn publish(
    store: &dyn CapabilityStore,
    device: &str,
    capability: Capability,
    value: impl Into<CapabilityValue>,
) {
    if let Err(e) = store.set_value(capability, value.into()).await {
        tracing::error!("[{}] Failed to set {}: {}", device, capability, e);
    }
}

/// In-memory capability store used by the daemon and by tests
pub struct MemoryCapabilityStore {
    device: String,
    slots: RwLock<HashMap<Capability, Option<CapabilityValue>>>,
    history: RwLock<Vec<(Capability, CapabilityValue)>>,
}

impl MemoryCapabilityStore {
    pub fn new(device: impl Into<String>, manifest: &[Capability]) -> Self {
        Self {
            device: device.into(),
            slots: RwLock::new(manifest.iter().map(|c| (*c, None)).collect()),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Every write in order
    pub async fn history(&self) -> Vec<(Capability, CapabilityValue)> {
        self.history.read().await.clone()
    }

    pub async fn capabilities(&self) -> Vec<Capability> {
        let mut caps: Vec<Capability> = self.slots.read().await.keys().copied().collect();
        caps.sort_by_key(|c| c.as_str());
        caps
    }
}

#[async_trait]
impl CapabilityStore for MemoryCapabilityStore {
    async fn set_value(&self, capability: Capability, value: CapabilityValue) -> Result<()> {
        let mut slots = self.slots.write().await;
        let slot = slots.get_mut(&capability).ok_or_else(|| {
            BridgeError::Capability(format!("{} has no capability {}", self.device, capability))
        })?;
        *slot = Some(value);
        drop(slots);

        self.history.write().await.push((capability, value));
        tracing::info!("[{}] {} = {}", self.device, capability, value);
        Ok(())
    }

    async fn get_value(&self, capability: Capability) -> Option<CapabilityValue> {
        self.slots.read().await.get(&capability).copied().flatten()
    }

    async fn has_capability(&self, capability: Capability) -> bool {
        self.slots.read().await.contains_key(&capability)
    }

    async fn add_capability(&self, capability: Capability) -> Result<()> {
        self.slots.write().await.entry(capability).or_insert(None);
        Ok(())
    }
}
