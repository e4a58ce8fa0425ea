//! Topology registry: gateway serial number → live thermostat controller
//!
//! Valves are created by the platform independently of their thermostat and
//! use this directory to find the controller that owns the gateway session.
//! The registry is an injected service rather than a global so every test
//! can work against its own instance.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::device::thermostat::ThermostatController;
use crate::easycontrol::identity::mask_serial;

#[derive(Debug, Clone)]
pub struct RegistryEntry<H> {
    pub display_name: String,
    pub handle: H,
}

pub struct TopologyRegistry<H> {
    entries: RwLock<HashMap<u64, RegistryEntry<H>>>,
}

/// Registry of thermostat controllers keyed by gateway serial number
pub type ThermostatRegistry = TopologyRegistry<Arc<ThermostatController>>;

impl<H: Clone + Send + Sync> TopologyRegistry<H> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handle, replacing any entry for the same key.
    /// Returns the replaced handle.
    pub async fn register(
        &self,
        serial_number: u64,
        display_name: impl Into<String>,
        handle: H,
    ) -> Option<H> {
        let entry = RegistryEntry {
            display_name: display_name.into(),
            handle,
        };

        let previous = {
            let mut map = self.entries.write().await;
            map.insert(serial_number, entry)
        };

        tracing::info!(
            "[Registry] Registered thermostat {}{}",
            mask_serial(serial_number),
            if previous.is_some() { " (replaced)" } else { "" }
        );

        previous.map(|e| e.handle)
    }

    /// Remove an entry. Returns false when nothing was registered.
    pub async fn unregister(&self, serial_number: u64) -> bool {
        let removed = {
            let mut map = self.entries.write().await;
            map.remove(&serial_number).is_some()
        };

        if removed {
            tracing::info!("[Registry] Removed thermostat {}", mask_serial(serial_number));
        }
        removed
    }

    /// Remove an entry only while it still holds the expected handle, so a
    /// stale controller cannot evict its replacement.
    pub async fn unregister_if<F>(&self, serial_number: u64, is_current: F) -> bool
    where
        F: FnOnce(&H) -> bool,
    {
        let removed = {
            let mut map = self.entries.write().await;
            match map.get(&serial_number) {
                Some(entry) if is_current(&entry.handle) => map.remove(&serial_number).is_some(),
                _ => false,
            }
        };

        if removed {
            tracing::info!("[Registry] Removed thermostat {}", mask_serial(serial_number));
        }
        removed
    }

    pub async fn lookup(&self, serial_number: u64) -> Option<H> {
        let map = self.entries.read().await;
        map.get(&serial_number).map(|e| e.handle.clone())
    }

    /// All registered serial numbers with their display names, by serial
    pub async fn list(&self) -> Vec<(u64, String)> {
        let map = self.entries.read().await;
        let mut list: Vec<(u64, String)> = map
            .iter()
            .map(|(serial, e)| (*serial, e.display_name.clone()))
            .collect();
        list.sort_by_key(|(serial, _)| *serial);
        list
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every entry. Returns how many were registered.
    pub async fn dispose(&self) -> usize {
        let mut map = self.entries.write().await;
        let count = map.len();
        map.clear();
        count
    }
}

impl<H: Clone + Send + Sync> Default for TopologyRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_then_unregister_reports_absent() {
        let registry: TopologyRegistry<u32> = TopologyRegistry::new();

        for key in [1u64, 42, 101234567] {
            registry.register(key, "Thermostat", 7).await;
            assert!(registry.unregister(key).await);
            assert_eq!(registry.lookup(key).await, None);
        }
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_register_overwrites() {
        let registry: TopologyRegistry<&'static str> = TopologyRegistry::new();

        assert_eq!(registry.register(5, "First", "h1").await, None);
        assert_eq!(registry.register(5, "Second", "h2").await, Some("h1"));

        assert_eq!(registry.lookup(5).await, Some("h2"));
        assert_eq!(registry.list().await, vec![(5, "Second".to_string())]);
    }

    #[tokio::test]
    async fn test_unregister_absent_is_noop() {
        let registry: TopologyRegistry<u8> = TopologyRegistry::new();
        assert!(!registry.unregister(9).await);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let registry: TopologyRegistry<u8> = TopologyRegistry::new();
        registry.register(30, "Upstairs", 1).await;
        registry.register(10, "Downstairs", 2).await;

        assert_eq!(
            registry.list().await,
            vec![(10, "Downstairs".to_string()), (30, "Upstairs".to_string())]
        );
    }

    #[tokio::test]
    async fn test_dispose_clears() {
        let registry: TopologyRegistry<u8> = TopologyRegistry::new();
        registry.register(1, "A", 1).await;
        registry.register(2, "B", 2).await;

        assert_eq!(registry.dispose().await, 2);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_lookups_see_whole_entries() {
        let registry: Arc<TopologyRegistry<(u64, u64)>> = Arc::new(TopologyRegistry::new());

        let writer = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for i in 0..200u64 {
                    registry.register(1, "T", (i, i)).await;
                    registry.unregister(1).await;
                }
            })
        };

        for _ in 0..200 {
            if let Some((a, b)) = registry.lookup(1).await {
                assert_eq!(a, b);
            }
            tokio::task::yield_now().await;
        }

        writer.await.unwrap();
        assert_eq!(registry.lookup(1).await, None);
    }
}
