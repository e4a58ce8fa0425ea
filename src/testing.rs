//! Test doubles shared by the unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{json, Value};

use crate::device::capability::{Capability, MemoryCapabilityStore};
use crate::device::clock::Clock;
use crate::device::registry::ThermostatRegistry;
use crate::device::settings::{MemorySettingsStore, RawSettings};
use crate::device::thermostat::{ChildDevice, ThermostatController};
use crate::easycontrol::client::EasyControlClient;
use crate::easycontrol::identity::DeviceIdentity;
use crate::easycontrol::transport::{Transport, TransportError};
use crate::error::{BridgeError, Result};

pub const SERIAL: u64 = 101234567;

/// Scripted in-memory gateway
pub struct MockTransport {
    responses: Mutex<HashMap<String, Value>>,
    failures: Mutex<HashMap<String, String>>,
    put_status: Mutex<String>,
    connect_error: Mutex<Option<String>>,
    read_delay: Mutex<Duration>,
    calls: Mutex<Vec<String>>,
    puts: Mutex<Vec<(String, Value)>>,
    disconnects: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            put_status: Mutex::new("ok".to_string()),
            connect_error: Mutex::new(None),
            read_delay: Mutex::new(Duration::ZERO),
            calls: Mutex::new(Vec::new()),
            puts: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Serve a raw response body for a path
    pub fn respond(&self, path: &str, body: Value) {
        self.responses.lock().unwrap().insert(path.to_string(), body);
    }

    /// Serve `{"id": path, "value": value}` for a path
    pub fn respond_value(&self, path: &str, value: Value) {
        self.respond(path, json!({ "id": path, "value": value }));
    }

    pub fn fail(&self, path: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(path.to_string(), message.to_string());
    }

    pub fn fail_connect(&self, message: &str) {
        *self.connect_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn set_put_status(&self, status: &str) {
        *self.put_status.lock().unwrap() = status.to_string();
    }

    /// Make every read take this long on the tokio clock
    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn reads_of(&self, path: &str) -> usize {
        let needle = format!("GET {}", path);
        self.calls().iter().filter(|c| **c == needle).count()
    }

    pub fn puts(&self) -> Vec<(String, Value)> {
        self.puts.lock().unwrap().clone()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _identity: &DeviceIdentity) -> std::result::Result<(), TransportError> {
        match self.connect_error.lock().unwrap().clone() {
            Some(message) => Err(TransportError::new(message)),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) -> std::result::Result<(), TransportError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, path: &str) -> std::result::Result<Value, TransportError> {
        self.calls.lock().unwrap().push(format!("GET {}", path));

        let delay = *self.read_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.failures.lock().unwrap().get(path) {
            return Err(TransportError::new(message.clone()));
        }

        self.responses
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| TransportError::new("HTTP_404"))
    }

    async fn put(&self, path: &str, body: Value) -> std::result::Result<Value, TransportError> {
        self.calls.lock().unwrap().push(format!("PUT {}", path));
        self.puts.lock().unwrap().push((path.to_string(), body));

        if let Some(message) = self.failures.lock().unwrap().get(path) {
            return Err(TransportError::new(message.clone()));
        }

        Ok(json!({ "status": self.put_status.lock().unwrap().clone() }))
    }
}

pub async fn connected_client() -> (Arc<MockTransport>, EasyControlClient) {
    let transport = Arc::new(MockTransport::new());
    let client = EasyControlClient::new(transport.clone());
    client
        .connect(&DeviceIdentity::new(SERIAL, "key", "pw"))
        .await
        .unwrap();
    (transport, client)
}

pub fn raw_settings(value: Value) -> RawSettings {
    match value {
        Value::Object(map) => map,
        _ => panic!("settings must be an object"),
    }
}

pub fn thermostat_settings(polling_interval: u64) -> RawSettings {
    raw_settings(json!({
        "serialNumber": SERIAL.to_string(),
        "accessKey": "abcd-efgh-ijkl",
        "password": "secret",
        "zoneId": "1",
        "deviceId": 1,
        "pollingInterval": polling_interval
    }))
}

pub fn valve_settings(device_id: u32) -> RawSettings {
    raw_settings(json!({
        "serialNumber": SERIAL,
        "zoneId": 1,
        "deviceId": device_id
    }))
}

pub struct ThermostatFixture {
    pub controller: Arc<ThermostatController>,
    pub transport: Arc<MockTransport>,
    pub capabilities: Arc<MemoryCapabilityStore>,
    pub settings: Arc<MemorySettingsStore>,
    pub registry: Arc<ThermostatRegistry>,
}

pub fn thermostat_fixture(settings: RawSettings) -> ThermostatFixture {
    thermostat_fixture_in(Arc::new(ThermostatRegistry::new()), settings)
}

pub fn thermostat_fixture_in(
    registry: Arc<ThermostatRegistry>,
    settings: RawSettings,
) -> ThermostatFixture {
    let transport = Arc::new(MockTransport::new());
    let capabilities = Arc::new(MemoryCapabilityStore::new(
        "Living room",
        &Capability::THERMOSTAT_MANIFEST,
    ));
    let settings = Arc::new(MemorySettingsStore::new(settings));

    let controller = ThermostatController::new(
        "Living room",
        transport.clone(),
        settings.clone(),
        capabilities.clone(),
        registry.clone(),
    );

    ThermostatFixture {
        controller,
        transport,
        capabilities,
        settings,
        registry,
    }
}

/// Clock that records requested delays without waiting. An optional hook
/// runs when the n-th sleep is requested.
pub struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
    hook: Mutex<Option<(usize, BoxFuture<'static, ()>)>>,
}

impl RecordingClock {
    pub fn new() -> Self {
        Self {
            sleeps: Mutex::new(Vec::new()),
            hook: Mutex::new(None),
        }
    }

    pub fn on_sleep(self, n: usize, hook: BoxFuture<'static, ()>) -> Self {
        *self.hook.lock().unwrap() = Some((n, hook));
        self
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for RecordingClock {
    async fn sleep(&self, duration: Duration) {
        let n = {
            let mut sleeps = self.sleeps.lock().unwrap();
            sleeps.push(duration);
            sleeps.len()
        };

        let hook = {
            let mut slot = self.hook.lock().unwrap();
            if matches!(slot.as_ref(), Some((at, _)) if *at == n) {
                slot.take().map(|(_, hook)| hook)
            } else {
                None
            }
        };

        if let Some(hook) = hook {
            hook.await;
        }
    }
}

/// Shared observations of probe children
#[derive(Default)]
pub struct ChildProbe {
    active: AtomicUsize,
    max_active: AtomicUsize,
    order: Mutex<Vec<String>>,
    writes_seen: Mutex<Vec<usize>>,
}

impl ChildProbe {
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn order(&self) -> Vec<String> {
        self.order.lock().unwrap().clone()
    }

    /// Parent capability writes observed when each refresh started
    pub fn writes_seen(&self) -> Vec<usize> {
        self.writes_seen.lock().unwrap().clone()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Succeed,
    Fail,
    Panic,
}

pub struct ProbeChild {
    name: String,
    probe: Arc<ChildProbe>,
    work: Duration,
    outcome: ProbeOutcome,
    parent_writes: Option<Arc<MemoryCapabilityStore>>,
}

impl ProbeChild {
    pub fn new(name: &str, probe: &Arc<ChildProbe>, work: Duration, outcome: ProbeOutcome) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            probe: probe.clone(),
            work,
            outcome,
            parent_writes: None,
        })
    }

    pub fn watching(
        name: &str,
        probe: &Arc<ChildProbe>,
        parent_writes: &Arc<MemoryCapabilityStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            probe: probe.clone(),
            work: Duration::from_millis(100),
            outcome: ProbeOutcome::Succeed,
            parent_writes: Some(parent_writes.clone()),
        })
    }
}

#[async_trait]
impl ChildDevice for ProbeChild {
    fn name(&self) -> &str {
        &self.name
    }

    async fn refresh(&self) -> Result<()> {
        if let Some(store) = &self.parent_writes {
            let seen = store.history().await.len();
            self.probe.writes_seen.lock().unwrap().push(seen);
        }

        let active = self.probe.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_active.fetch_max(active, Ordering::SeqCst);

        if !self.work.is_zero() {
            tokio::time::sleep(self.work).await;
        }

        self.probe.order.lock().unwrap().push(self.name.clone());
        self.probe.active.fetch_sub(1, Ordering::SeqCst);

        match self.outcome {
            ProbeOutcome::Succeed => Ok(()),
            ProbeOutcome::Fail => Err(BridgeError::CommandFailed("probe failure".into())),
            ProbeOutcome::Panic => panic!("probe panic"),
        }
    }
}
