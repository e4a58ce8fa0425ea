//! Error handling module

use thiserror::Error;

use crate::easycontrol::transport::TransportError;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Thermostat {serial_number} not found after {attempts} attempts")]
    DiscoveryFailed { serial_number: String, attempts: u32 },

    #[error("Pairing failed: {0}")]
    Pairing(String),

    #[error("Capability error: {0}")]
    Capability(String),
}

impl BridgeError {
    /// Build a command failure from a write acknowledgement status.
    pub fn command_failed(action: &str, status: Option<&str>) -> Self {
        BridgeError::CommandFailed(format!(
            "Failed to set {}: {}",
            action,
            status.unwrap_or("no response")
        ))
    }
}
