//! easycontrol-bridge
//!
//! Bridges EasyControl thermostats and their radiator valves into a home
//! automation platform: a polling loop per thermostat, valve fan-out over the
//! thermostat's gateway session, and typed capability updates.

pub mod config;
pub mod device;
pub mod easycontrol;
pub mod error;

#[cfg(test)]
mod testing;
