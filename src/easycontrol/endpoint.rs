//! EasyControl endpoint catalog
//!
//! Every logical gateway operation is bound to one path template. Templates
//! that address a zone or a device carry a single `%1` placeholder which must
//! be substituted before the path reaches the transport.

use std::fmt;

/// Placeholder token used by parameterized templates
pub const PLACEHOLDER: &str = "%1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Devices,

    Zones,
    ZoneTemperature,
    ZoneTargetTemperature,
    ZoneHumidity,
    ZoneManualTemperatureHeating,
    ZoneValvePosition,

    ApplianceSystemPressure,

    GatewayWifiRssi,

    HeatSourcesReturnTemperature,
    HeatSourcesActualModulation,

    DeviceBattery,
    DeviceSignal,
    DeviceValvePosition,
    DeviceTemperatureOffset,
    DeviceChildLockEnabled,
    DeviceThermostatChildLockEnabled,

    SystemOutsideTemperature,
    SystemTemperatureOffset,
}

impl Endpoint {
    pub const ALL: [Endpoint; 19] = [
        Endpoint::Devices,
        Endpoint::Zones,
        Endpoint::ZoneTemperature,
        Endpoint::ZoneTargetTemperature,
        Endpoint::ZoneHumidity,
        Endpoint::ZoneManualTemperatureHeating,
        Endpoint::ZoneValvePosition,
        Endpoint::ApplianceSystemPressure,
        Endpoint::GatewayWifiRssi,
        Endpoint::HeatSourcesReturnTemperature,
        Endpoint::HeatSourcesActualModulation,
        Endpoint::DeviceBattery,
        Endpoint::DeviceSignal,
        Endpoint::DeviceValvePosition,
        Endpoint::DeviceTemperatureOffset,
        Endpoint::DeviceChildLockEnabled,
        Endpoint::DeviceThermostatChildLockEnabled,
        Endpoint::SystemOutsideTemperature,
        Endpoint::SystemTemperatureOffset,
    ];

    /// Wire path template for this endpoint
    pub fn template(self) -> &'static str {
        match self {
            Endpoint::Devices => "/devices/list",

            Endpoint::Zones => "/zones/list",
            Endpoint::ZoneTemperature => "/zones/zn%1/temperatureActual",
            Endpoint::ZoneTargetTemperature => "/zones/zn%1/temperatureHeatingSetpoint",
            Endpoint::ZoneHumidity => "/zones/zn%1/humidity",
            Endpoint::ZoneManualTemperatureHeating => "/zones/zn%1/manualTemperatureHeating",
            Endpoint::ZoneValvePosition => "/zones/zn%1/actualValvePosition",

            Endpoint::ApplianceSystemPressure => "/system/appliance/systemPressure",

            Endpoint::GatewayWifiRssi => "/gateway/wifi/rssi",

            Endpoint::HeatSourcesReturnTemperature => "/heatSources/returnTemperature",
            Endpoint::HeatSourcesActualModulation => "/heatSources/actualModulation",

            Endpoint::DeviceBattery => "/devices/device%1/battery",
            Endpoint::DeviceSignal => "/devices/device%1/signal",
            Endpoint::DeviceValvePosition => "/devices/device%1/etrv/valvePosition",
            Endpoint::DeviceTemperatureOffset => "/devices/device%1/etrv/offset",
            Endpoint::DeviceChildLockEnabled => "/devices/device%1/etrv/childLock/enabled",
            Endpoint::DeviceThermostatChildLockEnabled => {
                "/devices/device%1/thermostat/childLock/enabled"
            }

            Endpoint::SystemOutsideTemperature => "/system/sensors/temperatures/outdoor_t1",
            Endpoint::SystemTemperatureOffset => "/system/sensors/temperatures/offset",
        }
    }

    pub fn is_parameterized(self) -> bool {
        self.template().contains(PLACEHOLDER)
    }

    /// Path of a fixed endpoint.
    ///
    /// Panics when called on a parameterized endpoint: dispatching an
    /// unresolved placeholder is a programming error.
    pub fn path(self) -> String {
        assert!(
            !self.is_parameterized(),
            "endpoint {:?} requires an identifier",
            self
        );
        self.template().to_string()
    }

    /// Path of a parameterized endpoint with the zone or device id inlined.
    ///
    /// Panics when called on a fixed endpoint.
    pub fn with_id(self, id: impl fmt::Display) -> String {
        assert!(
            self.is_parameterized(),
            "endpoint {:?} takes no identifier",
            self
        );
        self.template().replacen(PLACEHOLDER, &id.to_string(), 1)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.template())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_paths() {
        assert_eq!(Endpoint::Devices.path(), "/devices/list");
        assert_eq!(Endpoint::Zones.path(), "/zones/list");
        assert_eq!(
            Endpoint::ApplianceSystemPressure.path(),
            "/system/appliance/systemPressure"
        );
        assert_eq!(Endpoint::GatewayWifiRssi.path(), "/gateway/wifi/rssi");
        assert_eq!(
            Endpoint::SystemOutsideTemperature.path(),
            "/system/sensors/temperatures/outdoor_t1"
        );
    }

    #[test]
    fn test_zone_substitution() {
        assert_eq!(
            Endpoint::ZoneTemperature.with_id(1),
            "/zones/zn1/temperatureActual"
        );
        assert_eq!(
            Endpoint::ZoneManualTemperatureHeating.with_id(12),
            "/zones/zn12/manualTemperatureHeating"
        );
    }

    #[test]
    fn test_device_substitution() {
        assert_eq!(
            Endpoint::DeviceChildLockEnabled.with_id(7),
            "/devices/device7/etrv/childLock/enabled"
        );
        assert_eq!(
            Endpoint::DeviceThermostatChildLockEnabled.with_id(1),
            "/devices/device1/thermostat/childLock/enabled"
        );
    }

    #[test]
    fn test_no_placeholder_survives_substitution() {
        for endpoint in Endpoint::ALL {
            let path = if endpoint.is_parameterized() {
                endpoint.with_id(3)
            } else {
                endpoint.path()
            };
            assert!(!path.contains(PLACEHOLDER), "{} kept a placeholder", path);
            assert!(path.starts_with('/'));
        }
    }

    #[test]
    #[should_panic(expected = "requires an identifier")]
    fn test_unresolved_placeholder_panics() {
        let _ = Endpoint::DeviceBattery.path();
    }

    #[test]
    #[should_panic(expected = "takes no identifier")]
    fn test_identifier_on_fixed_endpoint_panics() {
        let _ = Endpoint::Devices.with_id(1);
    }
}
