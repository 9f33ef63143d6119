//! Defines shared data structures for the Bluetooth module.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::bluetooth::transport::{DeviceLink, GattCharacteristic, GattService};
use crate::error::{ErrorCategory, PeripheralError};

/// Lifecycle of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    DiscoveringServices,
    Subscribing,
    Connected,
    Disconnecting,
    Failed(ErrorCategory),
}

impl ConnectionState {
    /// States from which a new connect attempt may start.
    pub fn can_connect(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed(_))
    }

    /// True while an attempt is between Connecting and Connected.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Connecting | Self::DiscoveringServices | Self::Subscribing)
    }
}

/// What a characteristic advertises it can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub writable: bool,
    pub notifiable: bool,
    pub readable: bool,
}

impl Capabilities {
    pub const WRITE: Capabilities = Capabilities { writable: true, notifiable: false, readable: false };
    pub const NOTIFY: Capabilities = Capabilities { writable: false, notifiable: true, readable: false };
    pub const READ: Capabilities = Capabilities { writable: false, notifiable: false, readable: true };
    pub const READ_NOTIFY: Capabilities = Capabilities { writable: false, notifiable: true, readable: true };
    pub const READ_WRITE: Capabilities = Capabilities { writable: true, notifiable: false, readable: true };
}

/// Shared validity flag for every handle created during one connection
#[derive(Debug, Clone)]
pub(crate) struct Validity(Arc<AtomicBool>);

impl Validity {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub(crate) fn invalidate(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A discovered service, valid for one connection only
#[derive(Clone)]
pub struct ServiceHandle {
    pub(crate) service: Arc<dyn GattService>,
    pub(crate) validity: Validity,
}

impl ServiceHandle {
    pub fn uuid(&self) -> Uuid {
        self.service.uuid()
    }

    pub fn is_valid(&self) -> bool {
        self.validity.is_valid()
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("uuid", &self.uuid())
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// A discovered characteristic, scoped to its service and connection
#[derive(Clone)]
pub struct CharacteristicHandle {
    pub(crate) name: &'static str,
    pub(crate) service: Uuid,
    pub(crate) characteristic: Arc<dyn GattCharacteristic>,
    pub(crate) capabilities: Capabilities,
    pub(crate) validity: Validity,
}

impl CharacteristicHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn uuid(&self) -> Uuid {
        self.characteristic.uuid()
    }

    pub fn service(&self) -> Uuid {
        self.service
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn is_valid(&self) -> bool {
        self.validity.is_valid()
    }

    fn ensure_valid(&self) -> Result<(), PeripheralError> {
        if self.is_valid() {
            Ok(())
        } else {
            log::error!("Characteristic handle {} used after invalidation", self.name);
            Err(PeripheralError::Transport(format!(
                "handle for {} is no longer valid",
                self.name
            )))
        }
    }

    pub(crate) async fn write(&self, data: &[u8]) -> Result<(), PeripheralError> {
        self.ensure_valid()?;
        if !self.capabilities.writable {
            return Err(PeripheralError::MissingCapability { name: self.name, operation: "write" });
        }
        self.characteristic.write(data).await
    }

    pub(crate) async fn read(&self) -> Result<Vec<u8>, PeripheralError> {
        self.ensure_valid()?;
        if !self.capabilities.readable {
            return Err(PeripheralError::MissingCapability { name: self.name, operation: "read" });
        }
        self.characteristic.read().await
    }
}

impl fmt::Debug for CharacteristicHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CharacteristicHandle")
            .field("name", &self.name)
            .field("uuid", &self.uuid())
            .field("capabilities", &self.capabilities)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Notification listener that unsubscribes exactly once, when dropped.
pub(crate) struct NotificationSubscription {
    characteristic: Arc<dyn GattCharacteristic>,
}

impl NotificationSubscription {
    pub(crate) fn new(characteristic: Arc<dyn GattCharacteristic>) -> Self {
        Self { characteristic }
    }
}

impl Drop for NotificationSubscription {
    fn drop(&mut self) {
        log::debug!("Removing notification listener for {}", self.characteristic.uuid());
        self.characteristic.unsubscribe();
    }
}

/// Disconnect listener that is removed exactly once, when dropped.
pub(crate) struct DisconnectSubscription {
    device: Arc<dyn DeviceLink>,
}

impl DisconnectSubscription {
    pub(crate) fn new(device: Arc<dyn DeviceLink>) -> Self {
        Self { device }
    }
}

impl Drop for DisconnectSubscription {
    fn drop(&mut self) {
        log::debug!("Removing disconnect listener for {}", self.device.id());
        self.device.remove_disconnect_listener();
    }
}

/// One raw notification or read payload, immutable once created
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryFrame {
    source: Uuid,
    payload: Vec<u8>,
    received_at: DateTime<Utc>,
    sequence: u64,
}

impl TelemetryFrame {
    pub fn new(source: Uuid, payload: Vec<u8>, sequence: u64) -> Self {
        Self { source, payload, received_at: Utc::now(), sequence }
    }

    pub fn source(&self) -> Uuid {
        self.source
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Why a Connected session went away
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum DisconnectReason {
    /// The host asked for it
    Requested,
    /// The peripheral or radio dropped the link
    Lost,
}
