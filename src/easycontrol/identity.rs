//! Gateway credentials

use std::fmt;

/// Connection credentials for one gateway
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub serial_number: u64,
    pub access_key: String,
    pub password: String,
}

impl DeviceIdentity {
    pub fn new(serial_number: u64, access_key: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            serial_number,
            access_key: access_key.into(),
            password: password.into(),
        }
    }

    /// Serial number safe for log output
    pub fn masked_serial(&self) -> String {
        mask_serial(self.serial_number)
    }
}

// Credentials never reach the logs
impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("serial_number", &self.masked_serial())
            .field("access_key", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Keep only the last four digits of a serial number
pub fn mask_serial(serial_number: u64) -> String {
    let digits = serial_number.to_string();
    if digits.len() <= 4 {
        return "*".repeat(digits.len());
    }
    let visible = &digits[digits.len() - 4..];
    format!("{}{}", "*".repeat(digits.len() - 4), visible)
}
