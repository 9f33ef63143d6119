//! Peripheral registry
//! The host-facing table of managers, keyed by the stable extension id.

use std::collections::HashMap;
use std::sync::Arc;

use log::{info, warn};
use tokio::sync::RwLock;

use crate::config::ExtensionConfig;
use crate::core::bluetooth::{BluestTransport, PeripheralDescriptor, PeripheralManager, Transport};
use crate::error::PeripheralError;
use crate::host::HostBridge;

#[derive(Default)]
pub struct PeripheralRegistry {
    managers: RwLock<HashMap<&'static str, Arc<PeripheralManager>>>,
}

impl PeripheralRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the robot and the sensor ball on the system adapter.
    ///
    /// The adapter is looked up on the first connect, so a machine without
    /// one still registers both peripherals and fails each attempt instead.
    pub async fn init(config: ExtensionConfig, host: Arc<dyn HostBridge>) -> Self {
        info!("Initializing Bluetooth transport...");
        let transport = BluestTransport::new(config.scan_timeout());
        Self::with_defaults(Arc::new(transport), host, config).await
    }

    pub async fn with_defaults(
        transport: Arc<dyn Transport>,
        host: Arc<dyn HostBridge>,
        config: ExtensionConfig,
    ) -> Self {
        let registry = Self::new();
        for descriptor in [PeripheralDescriptor::drawing_robot(), PeripheralDescriptor::sensor_ball()] {
            registry
                .register(PeripheralManager::new(
                    descriptor,
                    transport.clone(),
                    host.clone(),
                    config.clone(),
                ))
                .await;
        }
        registry
    }

    /// Adds `manager`, replacing any manager registered under the same id.
    pub async fn register(&self, manager: PeripheralManager) -> Arc<PeripheralManager> {
        let manager = Arc::new(manager);
        let id = manager.extension_id();
        if self.managers.write().await.insert(id, manager.clone()).is_some() {
            warn!("Replaced the peripheral registered as {}", id);
        }
        manager
    }

    pub async fn get(&self, id: &str) -> Result<Arc<PeripheralManager>, PeripheralError> {
        self.managers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| PeripheralError::UnknownExtension(id.to_string()))
    }

    pub async fn extension_ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<&'static str> = self.managers.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn connect(&self, id: &str) -> Result<(), PeripheralError> {
        self.get(id).await?.connect().await
    }

    pub async fn is_connected(&self, id: &str) -> bool {
        match self.get(id).await {
            Ok(manager) => manager.is_connected(),
            Err(_) => false,
        }
    }

    pub async fn disconnect(&self, id: &str) -> Result<(), PeripheralError> {
        self.get(id).await?.disconnect().await;
        Ok(())
    }

    /// Stops every registered peripheral, one after another.
    pub async fn stop_all(&self) {
        let managers: Vec<Arc<PeripheralManager>> =
            self.managers.read().await.values().cloned().collect();
        for manager in managers {
            manager.stop_all().await;
        }
    }
}
