//! EasyControl wire responses

use std::fmt;

use serde::{Deserialize, Serialize};

/// Acknowledgement status the gateway returns for a successful write
pub const STATUS_OK: &str = "ok";

/// Unit attached to a value response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UnitOfMeasure {
    Celsius,
    Fahrenheit,
    Other(String),
}

impl From<String> for UnitOfMeasure {
    fn from(s: String) -> Self {
        match s.as_str() {
            "C" => UnitOfMeasure::Celsius,
            "F" => UnitOfMeasure::Fahrenheit,
            _ => UnitOfMeasure::Other(s),
        }
    }
}

impl From<UnitOfMeasure> for String {
    fn from(unit: UnitOfMeasure) -> Self {
        unit.to_string()
    }
}

impl fmt::Display for UnitOfMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitOfMeasure::Celsius => f.write_str("C"),
            UnitOfMeasure::Fahrenheit => f.write_str("F"),
            UnitOfMeasure::Other(s) => f.write_str(s),
        }
    }
}

/// Result of a read. Only `value` is mandatory; a response without it is
/// treated as missing data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueResponse<T> {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub value_type: Option<String>,
    #[serde(default)]
    pub writeable: Option<i64>,
    #[serde(default)]
    pub recordable: Option<i64>,
    pub value: T,
    #[serde(default)]
    pub used: Option<String>,
    #[serde(default)]
    pub unit_of_measure: Option<UnitOfMeasure>,
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub max_value: Option<f64>,
    #[serde(default)]
    pub step_size: Option<f64>,
}

impl<T> ValueResponse<T> {
    /// Unit suffix for log lines, empty when the gateway sent none
    pub fn unit(&self) -> String {
        self.unit_of_measure
            .as_ref()
            .map(|u| u.to_string())
            .unwrap_or_default()
    }
}

/// Write acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutResponse {
    pub status: String,
}

impl PutResponse {
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Entry of `/devices/list`. The name is base64 encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceResponse {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub zone: u32,
}

/// Entry of `/zones/list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneResponse {
    pub id: u32,
    #[serde(default)]
    pub name: String,
}
