//! Device lookup on a real adapter
//! `BluestTransport` finds the first device whose name matches a prefix,
//! preferring one the system is already connected to.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bluest::{Adapter, Device};
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::core::bluetooth::gatt::BluestDevice;
use crate::core::bluetooth::transport::{DeviceLink, Transport};
use crate::error::PeripheralError;

/// Production transport backed by the system Bluetooth adapter
pub struct BluestTransport {
    /// Looked up on the first device request, then reused
    adapter: OnceCell<Adapter>,
    scan_timeout: Duration,
}

impl BluestTransport {
    pub fn new(scan_timeout: Duration) -> Self {
        Self {
            adapter: OnceCell::new(),
            scan_timeout,
        }
    }

    async fn adapter(&self) -> Result<&Adapter, PeripheralError> {
        self.adapter
            .get_or_try_init(|| async {
                info!("Initializing Bluetooth adapter...");
                let adapter = Adapter::default().await.ok_or_else(|| {
                    error!("No Bluetooth adapter found");
                    PeripheralError::AdapterUnavailable
                })?;
                adapter.wait_available().await.map_err(|e| {
                    error!("Bluetooth adapter did not become available: {}", e);
                    PeripheralError::AdapterUnavailable
                })?;
                info!("Bluetooth adapter is available.");
                Ok(adapter)
            })
            .await
    }

    fn name_matches(device: &Device, advertised: Option<&str>, name_prefix: &str) -> bool {
        match advertised {
            Some(name) => name.starts_with(name_prefix),
            None => device
                .name()
                .is_ok_and(|name| name.starts_with(name_prefix)),
        }
    }

    async fn find_device(
        adapter: &Adapter,
        name_prefix: &str,
    ) -> Result<Option<Device>, bluest::Error> {
        info!("Checking for connected devices");
        for device in adapter.connected_devices().await? {
            if Self::name_matches(&device, None, name_prefix) {
                info!("Using already connected device {}", device.id());
                return Ok(Some(device));
            }
        }

        info!("Starting bluetooth scan for {:?}", name_prefix);
        let mut scan_stream = adapter.scan(&[]).await?;
        while let Some(discovered) = scan_stream.next().await {
            debug!(
                "Found device - Device: {:?}, Name: {:?}, RSSI: {:?}",
                discovered.device, discovered.adv_data.local_name, discovered.rssi
            );
            let advertised = discovered.adv_data.local_name.as_deref();
            if Self::name_matches(&discovered.device, advertised, name_prefix) {
                return Ok(Some(discovered.device));
            }
        }
        info!("Bluetooth scan stream has ended.");
        Ok(None)
    }
}

#[async_trait]
impl Transport for BluestTransport {
    async fn request_device(
        &self,
        name_prefix: &str,
        required_services: &[Uuid],
    ) -> Result<Arc<dyn DeviceLink>, PeripheralError> {
        debug!("Requesting access to services {:?}", required_services);
        let adapter = self.adapter().await?;
        let found =
            tokio::time::timeout(self.scan_timeout, Self::find_device(adapter, name_prefix)).await;
        match found {
            Ok(Ok(Some(device))) => Ok(Arc::new(BluestDevice::new(adapter.clone(), device))),
            Ok(Ok(None)) => Err(PeripheralError::DeviceNotFound(name_prefix.to_string())),
            Ok(Err(e)) => Err(PeripheralError::transport(e)),
            Err(_) => {
                info!("No {:?} device found within {:?}", name_prefix, self.scan_timeout);
                Err(PeripheralError::DeviceNotFound(name_prefix.to_string()))
            }
        }
    }
}
