//! Platform-side device controllers and the boundaries they talk through

pub mod actions;
pub mod capability;
pub mod clock;
pub mod pairing;
pub mod registry;
pub mod scheduler;
pub mod settings;
pub mod thermostat;
pub mod valve;

pub use registry::ThermostatRegistry;
pub use thermostat::{ChildDevice, ThermostatController};
pub use valve::ValveController;

use crate::easycontrol::models::PutResponse;
use crate::error::{BridgeError, Result};

pub const MIN_TEMPERATURE_OFFSET: f64 = -2.0;
pub const MAX_TEMPERATURE_OFFSET: f64 = 2.0;

/// Offsets are accepted in [-2, 2] in steps of 0.5
pub fn validate_temperature_offset(value: f64) -> Result<()> {
    if !value.is_finite() || !(MIN_TEMPERATURE_OFFSET..=MAX_TEMPERATURE_OFFSET).contains(&value) {
        return Err(BridgeError::Validation(format!(
            "Temperature offset {} is outside [{}, {}]",
            value, MIN_TEMPERATURE_OFFSET, MAX_TEMPERATURE_OFFSET
        )));
    }

    if (value * 2.0).fract() != 0.0 {
        return Err(BridgeError::Validation(format!(
            "Temperature offset {} is not a multiple of 0.5",
            value
        )));
    }

    Ok(())
}

/// Turn a write acknowledgement into a command result
pub(crate) fn check_ack(response: Option<PutResponse>, action: &str) -> Result<()> {
    match response {
        Some(ack) if ack.is_ok() => Ok(()),
        Some(ack) => Err(BridgeError::command_failed(action, Some(&ack.status))),
        None => Err(BridgeError::command_failed(action, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_offset_validation() {
        for value in [-2.0, -1.5, 0.0, 0.5, 2.0] {
            assert_ok!(validate_temperature_offset(value));
        }
        for value in [2.1, -2.5, 0.3, f64::NAN] {
            assert_err!(validate_temperature_offset(value));
        }
    }

    #[test]
    fn test_check_ack() {
        let ok = PutResponse {
            status: "ok".into(),
        };
        assert_ok!(check_ack(Some(ok), "target temperature"));

        let failed = PutResponse {
            status: "error".into(),
        };
        let err = check_ack(Some(failed), "target temperature").unwrap_err();
        assert!(err.to_string().contains("Failed to set target temperature: error"));

        assert_err!(check_ack(None, "child lock status"));
    }
}
