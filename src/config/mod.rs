//! Configuration module

use serde::Deserialize;
use serde_json::Value;

use crate::device::settings::{
    RawSettings, ACCESS_KEY, DEVICE_ID, PASSWORD, POLLING_INTERVAL, SERIAL_NUMBER, ZONE_ID,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub thermostats: Vec<ThermostatConfig>,
    #[serde(default)]
    pub valves: Vec<ValveConfig>,
}

/// HTTP relay in front of the gateway messaging service
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_relay_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: default_relay_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct ThermostatConfig {
    pub name: String,
    pub serial_number: u64,
    pub access_key: String,
    pub password: String,
    pub zone_id: u32,
    #[serde(default)]
    pub device_id: Option<u32>,
    #[serde(default = "default_polling_interval")]
    pub polling_interval: u64,
}

// Keep credentials out of debug output
impl std::fmt::Debug for ThermostatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThermostatConfig")
            .field("name", &self.name)
            .field("zone_id", &self.zone_id)
            .field("device_id", &self.device_id)
            .field("polling_interval", &self.polling_interval)
            .finish_non_exhaustive()
    }
}

impl ThermostatConfig {
    /// Settings in the shape the platform persists them
    pub fn to_settings(&self) -> RawSettings {
        let mut raw = RawSettings::new();
        raw.insert(SERIAL_NUMBER.into(), self.serial_number.into());
        raw.insert(ACCESS_KEY.into(), self.access_key.clone().into());
        raw.insert(PASSWORD.into(), self.password.clone().into());
        raw.insert(ZONE_ID.into(), self.zone_id.into());
        raw.insert(
            DEVICE_ID.into(),
            self.device_id.map(Value::from).unwrap_or(Value::Null),
        );
        raw.insert(POLLING_INTERVAL.into(), self.polling_interval.into());
        raw
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValveConfig {
    pub name: String,
    pub serial_number: u64,
    pub zone_id: u32,
    pub device_id: u32,
}

impl ValveConfig {
    pub fn to_settings(&self) -> RawSettings {
        let mut raw = RawSettings::new();
        raw.insert(SERIAL_NUMBER.into(), self.serial_number.into());
        raw.insert(ZONE_ID.into(), self.zone_id.into());
        raw.insert(DEVICE_ID.into(), self.device_id.into());
        raw
    }
}

fn default_relay_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_polling_interval() -> u64 {
    30
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("EASYCONTROL").separator("__"));

        Self::build(builder)
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> anyhow::Result<Self> {
        let config: Config = builder.build()?.try_deserialize()?;
        Ok(config)
    }
}
