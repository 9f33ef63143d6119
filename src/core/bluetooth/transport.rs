//! Transport boundary
//! The session talks to the radio only through these traits. `BluestTransport`
//! is the production implementation; tests use an in-memory one.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::bluetooth::types::Capabilities;
use crate::error::PeripheralError;

/// Invoked with the raw payload of every notification.
pub type NotifyCallback = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

/// Invoked when the link drops without being asked to.
pub type DisconnectCallback = Arc<dyn Fn() + Send + Sync>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Finds a device whose advertised name starts with `name_prefix`.
    async fn request_device(
        &self,
        name_prefix: &str,
        required_services: &[Uuid],
    ) -> Result<Arc<dyn DeviceLink>, PeripheralError>;
}

#[async_trait]
pub trait DeviceLink: Send + Sync {
    fn id(&self) -> String;

    fn name(&self) -> Option<String>;

    async fn connect(&self) -> Result<Arc<dyn GattServer>, PeripheralError>;

    async fn disconnect(&self) -> Result<(), PeripheralError>;

    /// Replaces any previously registered disconnect listener.
    fn on_disconnected(&self, callback: DisconnectCallback);

    fn remove_disconnect_listener(&self);
}

#[async_trait]
pub trait GattServer: Send + Sync {
    async fn get_service(&self, id: Uuid) -> Result<Arc<dyn GattService>, PeripheralError>;
}

#[async_trait]
pub trait GattService: Send + Sync {
    fn uuid(&self) -> Uuid;

    async fn get_characteristic(
        &self,
        id: Uuid,
    ) -> Result<Arc<dyn GattCharacteristic>, PeripheralError>;
}

#[async_trait]
pub trait GattCharacteristic: Send + Sync {
    fn uuid(&self) -> Uuid;

    fn capabilities(&self) -> Capabilities;

    async fn write(&self, data: &[u8]) -> Result<(), PeripheralError>;

    async fn read(&self) -> Result<Vec<u8>, PeripheralError>;

    /// Resolves once notifications are flowing into `callback`.
    async fn subscribe(&self, callback: NotifyCallback) -> Result<(), PeripheralError>;

    /// Local bookkeeping only, never fails.
    fn unsubscribe(&self);
}
