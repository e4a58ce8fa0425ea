//! EasyControl gateway integration module
//!
//! - `endpoint`: Logical operations and their wire paths
//! - `models`: Wire responses
//! - `identity`: Gateway credentials
//! - `transport`: Transport boundary and the HTTP relay transport
//! - `client`: Typed read/write client

pub mod client;
pub mod endpoint;
pub mod identity;
pub mod models;
pub mod transport;

pub use client::EasyControlClient;
pub use endpoint::Endpoint;
pub use identity::DeviceIdentity;
pub use transport::{HttpTransport, Transport, TransportError};
