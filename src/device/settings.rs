//! Device settings
//!
//! The platform persists settings as a loose key/value map in which numeric
//! fields may arrive as text. `ThermostatSettings::from_raw` and
//! `ValveSettings::from_raw` coerce that map once; the controllers only ever
//! see the validated structures.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::easycontrol::identity::DeviceIdentity;
use crate::error::{BridgeError, Result};

pub const SERIAL_NUMBER: &str = "serialNumber";
pub const ACCESS_KEY: &str = "accessKey";
pub const PASSWORD: &str = "password";
pub const ZONE_ID: &str = "zoneId";
pub const DEVICE_ID: &str = "deviceId";
pub const POLLING_INTERVAL: &str = "pollingInterval";

pub const DEFAULT_POLLING_INTERVAL_SECS: u64 = 30;
/// Longer intervals are clamped to one day
pub const MAX_POLLING_INTERVAL_SECS: u64 = 86_400;

pub type RawSettings = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct ThermostatSettings {
    pub identity: DeviceIdentity,
    pub zone_id: u32,
    /// Gateway device id of the thermostat itself
    pub device_id: Option<u32>,
    pub polling_interval: Duration,
}

impl ThermostatSettings {
    pub fn from_raw(raw: &RawSettings) -> Result<Self> {
        let serial_number = required_u64(raw, SERIAL_NUMBER)?;
        let access_key = required_str(raw, ACCESS_KEY)?;
        let password = required_str(raw, PASSWORD)?;

        Ok(Self {
            identity: DeviceIdentity::new(serial_number, access_key, password),
            zone_id: required_u32(raw, ZONE_ID)?,
            device_id: optional_u32(raw, DEVICE_ID)?,
            polling_interval: polling_interval(raw),
        })
    }

    pub fn to_raw(&self) -> RawSettings {
        let mut raw = Map::new();
        raw.insert(SERIAL_NUMBER.into(), self.identity.serial_number.into());
        raw.insert(ACCESS_KEY.into(), self.identity.access_key.clone().into());
        raw.insert(PASSWORD.into(), self.identity.password.clone().into());
        raw.insert(ZONE_ID.into(), self.zone_id.into());
        if let Some(device_id) = self.device_id {
            raw.insert(DEVICE_ID.into(), device_id.into());
        }
        raw.insert(POLLING_INTERVAL.into(), self.polling_interval.as_secs().into());
        raw
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValveSettings {
    pub serial_number: u64,
    pub zone_id: u32,
    pub device_id: u32,
}

impl ValveSettings {
    pub fn from_raw(raw: &RawSettings) -> Result<Self> {
        Ok(Self {
            serial_number: required_u64(raw, SERIAL_NUMBER)?,
            zone_id: required_u32(raw, ZONE_ID)?,
            device_id: required_u32(raw, DEVICE_ID)?,
        })
    }

    pub fn to_raw(&self) -> RawSettings {
        let mut raw = Map::new();
        raw.insert(SERIAL_NUMBER.into(), self.serial_number.into());
        raw.insert(ZONE_ID.into(), self.zone_id.into());
        raw.insert(DEVICE_ID.into(), self.device_id.into());
        raw
    }
}

/// Polling interval with the default applied to missing, malformed and
/// non-positive values, capped at `MAX_POLLING_INTERVAL_SECS`
pub fn polling_interval(raw: &RawSettings) -> Duration {
    let secs = raw
        .get(POLLING_INTERVAL)
        .and_then(coerce_f64)
        .filter(|v| *v > 0.0)
        .map(|v| (v.trunc() as u64).min(MAX_POLLING_INTERVAL_SECS))
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_POLLING_INTERVAL_SECS);
    Duration::from_secs(secs)
}

/// Numeric value from a number or a numeric string
pub fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Non-negative integer from a number or a string. Fractions are truncated.
pub fn coerce_u64(value: &Value) -> Option<u64> {
    if let Value::Number(n) = value {
        if let Some(v) = n.as_u64() {
            return Some(v);
        }
    }
    if let Value::String(s) = value {
        if let Ok(v) = s.trim().parse::<u64>() {
            return Some(v);
        }
    }
    coerce_f64(value)
        .filter(|v| *v >= 0.0 && *v <= u64::MAX as f64)
        .map(|v| v.trunc() as u64)
}

fn required_u64(raw: &RawSettings, key: &str) -> Result<u64> {
    let value = raw
        .get(key)
        .ok_or_else(|| BridgeError::InvalidSettings(format!("{} is missing", key)))?;
    coerce_u64(value)
        .ok_or_else(|| BridgeError::InvalidSettings(format!("{} is not a number: {}", key, value)))
}

fn required_u32(raw: &RawSettings, key: &str) -> Result<u32> {
    let value = required_u64(raw, key)?;
    u32::try_from(value)
        .map_err(|_| BridgeError::InvalidSettings(format!("{} is out of range: {}", key, value)))
}

fn optional_u32(raw: &RawSettings, key: &str) -> Result<Option<u32>> {
    match raw.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(_) => required_u32(raw, key).map(Some),
    }
}

fn required_str(raw: &RawSettings, key: &str) -> Result<String> {
    match raw.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(BridgeError::InvalidSettings(format!("{} is missing", key))),
    }
}

/// Settings persistence of the home-automation platform
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;

    async fn get_all(&self) -> RawSettings;

    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

#[derive(Default)]
pub struct MemorySettingsStore {
    values: RwLock<RawSettings>,
}

impl MemorySettingsStore {
    pub fn new(values: RawSettings) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get(&self, key: &str) -> Option<Value> {
        self.values.read().await.get(key).cloned()
    }

    async fn get_all(&self) -> RawSettings {
        self.values.read().await.clone()
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }
}
