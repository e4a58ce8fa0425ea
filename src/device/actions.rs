//! Automation actions and conditions
//!
//! Flow cards hand their arguments over as text; these helpers parse them and
//! dispatch to whichever controller the card targets.

use async_trait::async_trait;

use crate::device::thermostat::ThermostatController;
use crate::device::valve::ValveController;
use crate::error::{BridgeError, Result};

/// Commands shared by thermostats and valves
#[async_trait]
pub trait DeviceActions: Send + Sync {
    async fn set_temperature_offset(&self, offset: f64) -> Result<()>;

    async fn set_child_lock(&self, enabled: bool) -> Result<()>;

    async fn child_lock(&self) -> Option<bool>;
}

#[async_trait]
impl DeviceActions for ThermostatController {
    async fn set_temperature_offset(&self, offset: f64) -> Result<()> {
        ThermostatController::set_temperature_offset(self, offset).await
    }

    async fn set_child_lock(&self, enabled: bool) -> Result<()> {
        ThermostatController::set_child_lock(self, enabled).await
    }

    async fn child_lock(&self) -> Option<bool> {
        ThermostatController::child_lock(self).await
    }
}

#[async_trait]
impl DeviceActions for ValveController {
    async fn set_temperature_offset(&self, offset: f64) -> Result<()> {
        ValveController::set_temperature_offset(self, offset).await
    }

    async fn set_child_lock(&self, enabled: bool) -> Result<()> {
        ValveController::set_child_lock(self, enabled).await
    }

    async fn child_lock(&self) -> Option<bool> {
        ValveController::child_lock(self).await
    }
}

pub fn parse_offset_argument(text: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| BridgeError::Validation(format!("Invalid temperature offset: {:?}", text)))
}

/// Only `true` (any case) locks
pub fn parse_lock_argument(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case("true")
}

pub async fn run_set_temperature_offset(device: &dyn DeviceActions, offset: &str) -> Result<()> {
    device
        .set_temperature_offset(parse_offset_argument(offset)?)
        .await
}

pub async fn run_set_child_lock(device: &dyn DeviceActions, lock: &str) -> Result<()> {
    device.set_child_lock(parse_lock_argument(lock)).await
}

/// "Child lock is ..." condition. An unknown lock state never matches.
pub async fn child_lock_is(device: &dyn DeviceActions, lock: &str) -> bool {
    device.child_lock().await == Some(parse_lock_argument(lock))
}
