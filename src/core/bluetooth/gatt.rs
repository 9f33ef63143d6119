//! `bluest` implementations of the transport traits.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bluest::{Adapter, Characteristic, ConnectionEvent, Device, Service};
use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::transport::{
    DeviceLink, DisconnectCallback, GattCharacteristic, GattServer, GattService, NotifyCallback,
};
use crate::core::bluetooth::types::Capabilities;
use crate::error::PeripheralError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cancels the previous background task, if any, and stores `next`.
fn replace_task(slot: &Mutex<Option<CancellationToken>>, next: Option<CancellationToken>) {
    if let Some(previous) = std::mem::replace(&mut *lock(slot), next) {
        previous.cancel();
    }
}

pub struct BluestDevice {
    adapter: Adapter,
    device: Device,
    /// Connection-event watcher
    listener: Mutex<Option<CancellationToken>>,
}

impl BluestDevice {
    pub fn new(adapter: Adapter, device: Device) -> Self {
        Self { adapter, device, listener: Mutex::new(None) }
    }
}

#[async_trait]
impl DeviceLink for BluestDevice {
    fn id(&self) -> String {
        self.device.id().to_string()
    }

    fn name(&self) -> Option<String> {
        self.device.name().ok()
    }

    async fn connect(&self) -> Result<Arc<dyn GattServer>, PeripheralError> {
        if !self.device.is_connected().await {
            info!("Initiating connection to {}...", self.device.id());
            self.adapter
                .connect_device(&self.device)
                .await
                .map_err(PeripheralError::transport)?;
        }
        Ok(Arc::new(BluestServer { device: self.device.clone() }))
    }

    async fn disconnect(&self) -> Result<(), PeripheralError> {
        if self.device.is_connected().await {
            self.adapter
                .disconnect_device(&self.device)
                .await
                .map_err(PeripheralError::transport)?;
            info!("Successfully disconnected");
        } else {
            info!("Device {} not connected", self.device.id());
        }
        Ok(())
    }

    fn on_disconnected(&self, callback: DisconnectCallback) {
        let cancel = CancellationToken::new();
        replace_task(&self.listener, Some(cancel.clone()));

        let adapter = self.adapter.clone();
        let device = self.device.clone();
        tokio::spawn(async move {
            let events = match adapter.device_connection_events(&device).await {
                Ok(events) => events,
                Err(e) => {
                    warn!("Cannot watch connection events of {}: {}", device.id(), e);
                    return;
                }
            };
            futures_util::pin_mut!(events);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.next() => match event {
                        Some(ConnectionEvent::Disconnected) => {
                            info!("Device {} disconnected", device.id());
                            callback();
                            break;
                        }
                        Some(ConnectionEvent::Connected) => {}
                        None => break,
                    }
                }
            }
        });
    }

    fn remove_disconnect_listener(&self) {
        replace_task(&self.listener, None);
    }
}

struct BluestServer {
    device: Device,
}

#[async_trait]
impl GattServer for BluestServer {
    async fn get_service(&self, id: Uuid) -> Result<Arc<dyn GattService>, PeripheralError> {
        let services = self
            .device
            .discover_services_with_uuid(id)
            .await
            .map_err(PeripheralError::transport)?;
        let service = services
            .into_iter()
            .next()
            .ok_or(PeripheralError::ServiceNotFound(id))?;
        Ok(Arc::new(BluestService { service }))
    }
}

struct BluestService {
    service: Service,
}

#[async_trait]
impl GattService for BluestService {
    fn uuid(&self) -> Uuid {
        self.service.uuid()
    }

    async fn get_characteristic(
        &self,
        id: Uuid,
    ) -> Result<Arc<dyn GattCharacteristic>, PeripheralError> {
        let characteristic = self
            .service
            .discover_characteristics_with_uuid(id)
            .await
            .map_err(PeripheralError::transport)?
            .into_iter()
            .next()
            .ok_or(PeripheralError::CharacteristicNotFound(id))?;
        let properties = characteristic
            .properties()
            .await
            .map_err(PeripheralError::transport)?;
        let capabilities = Capabilities {
            writable: properties.write || properties.write_without_response,
            notifiable: properties.notify || properties.indicate,
            readable: properties.read,
        };
        Ok(Arc::new(BluestCharacteristic {
            characteristic,
            capabilities,
            notifications: Mutex::new(None),
        }))
    }
}

struct BluestCharacteristic {
    characteristic: Characteristic,
    capabilities: Capabilities,
    /// Notification reader task
    notifications: Mutex<Option<CancellationToken>>,
}

#[async_trait]
impl GattCharacteristic for BluestCharacteristic {
    fn uuid(&self) -> Uuid {
        self.characteristic.uuid()
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn write(&self, data: &[u8]) -> Result<(), PeripheralError> {
        self.characteristic
            .write(data)
            .await
            .map_err(PeripheralError::transport)
    }

    async fn read(&self) -> Result<Vec<u8>, PeripheralError> {
        self.characteristic
            .read()
            .await
            .map_err(PeripheralError::transport)
    }

    async fn subscribe(&self, callback: NotifyCallback) -> Result<(), PeripheralError> {
        let cancel = CancellationToken::new();
        replace_task(&self.notifications, Some(cancel.clone()));

        let characteristic = self.characteristic.clone();
        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(async move {
            let mut notification_stream = match characteristic.notify().await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(PeripheralError::transport(e)));
                    return;
                }
            };
            info!("Listening for notifications on {}", characteristic.uuid());
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = notification_stream.next() => match result {
                        Some(Ok(value)) => {
                            debug!("Received {} bytes from {}", value.len(), characteristic.uuid());
                            callback(value);
                        }
                        Some(Err(e)) => warn!("Notification error on {}: {}", characteristic.uuid(), e),
                        None => {
                            info!("Notification stream of {} has ended.", characteristic.uuid());
                            break;
                        }
                    }
                }
            }
        });

        ready_rx
            .await
            .map_err(|_| PeripheralError::Transport("notification task ended early".to_string()))?
    }

    fn unsubscribe(&self) {
        replace_task(&self.notifications, None);
    }
}
