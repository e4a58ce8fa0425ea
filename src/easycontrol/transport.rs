//! Transport boundary towards the gateway
//!
//! The controllers only need four operations from the vendor messaging
//! layer. `HttpTransport` implements them against an HTTP relay that fronts
//! the gateway; tests substitute their own implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use url::Url;

use crate::config::RelayConfig;
use crate::easycontrol::identity::DeviceIdentity;

/// Message the transport uses to signal rate limiting
pub const RATE_LIMIT_MESSAGE: &str = "HTTP_TOO_MANY_REQUESTS";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn rate_limited() -> Self {
        Self::new(RATE_LIMIT_MESSAGE)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.message == RATE_LIMIT_MESSAGE
    }
}

/// Operations the gateway session exposes
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, identity: &DeviceIdentity) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;

    async fn get(&self, path: &str) -> Result<Value, TransportError>;

    async fn put(&self, path: &str, body: Value) -> Result<Value, TransportError>;
}

/// Transport speaking to an HTTP relay in front of the gateway
pub struct HttpTransport {
    base_url: Url,
    http_client: Client,
    session: RwLock<Option<DeviceIdentity>>,
}

impl HttpTransport {
    pub fn new(config: &RelayConfig) -> Result<Self, TransportError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| TransportError::new(format!("Invalid relay URL: {}", e)))?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::new(format!("HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            http_client,
            session: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::new(format!("Invalid path {}: {}", path, e)))
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        let serial = {
            let session = self.session.read().await;
            session
                .as_ref()
                .map(|s| s.serial_number)
                .ok_or_else(|| TransportError::new("No active session"))?
        };

        let mut req = self
            .http_client
            .request(method, self.url(path)?)
            .header("X-Gateway-Serial", serial.to_string());

        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| TransportError::new(format!("Request to {} failed: {}", path, e)))?;

        Self::check_status(resp.status())?;

        resp.json()
            .await
            .map_err(|e| TransportError::new(format!("Response parse failed for {}: {}", path, e)))
    }

    fn check_status(status: StatusCode) -> Result<(), TransportError> {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TransportError::rate_limited());
        }
        if !status.is_success() {
            return Err(TransportError::new(format!("HTTP_{}", status.as_u16())));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self, identity: &DeviceIdentity) -> Result<(), TransportError> {
        let body = serde_json::json!({
            "serialNumber": identity.serial_number.to_string(),
            "accessKey": identity.access_key,
            "password": identity.password,
        });

        let resp = self
            .http_client
            .post(self.url("/session")?)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::new(format!("Session request failed: {}", e)))?;

        Self::check_status(resp.status())?;

        let mut session = self.session.write().await;
        *session = Some(identity.clone());

        tracing::info!(
            "[EasyControl] Relay session opened for gateway {}",
            identity.masked_serial()
        );
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if self.session.read().await.is_none() {
            return Ok(());
        }

        let result = self.request(Method::DELETE, "/session", None).await;

        let mut session = self.session.write().await;
        *session = None;

        result.map(|_| ())
    }

    async fn get(&self, path: &str) -> Result<Value, TransportError> {
        self.request(Method::GET, path, None).await
    }

    async fn put(&self, path: &str, body: Value) -> Result<Value, TransportError> {
        self.request(Method::PUT, path, Some(&body)).await
    }
}
