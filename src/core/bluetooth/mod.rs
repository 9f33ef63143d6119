//! Bluetooth session layer
//! Finding a peripheral, connecting, discovering its attributes, subscribing
//! to notifications, sending commands and polling values that cannot notify.

mod commands;
mod connection;
pub mod constants;
mod device;
pub mod directory;
mod gatt;
mod manager;
#[cfg(test)]
pub(crate) mod mock;
mod notification;
mod poller;
mod scanner;
mod transport;
mod types;

pub use commands::{color_from_hex, CommandFacade, CommandSender};
pub use connection::{command_target, PeripheralSession, WeakSession};
pub use device::{PeripheralDescriptor, PeripheralKind};
pub use directory::{AttributeDirectory, AttributeEntry, AttributeKind, DIRECTORY};
pub use gatt::BluestDevice;
pub use manager::{sensor_ball_setup, PeripheralManager};
pub use notification::{ReadingObserver, TelemetryIngestor, TelemetryReading};
pub use poller::Poller;
pub use scanner::BluestTransport;
pub use transport::{
    DeviceLink, DisconnectCallback, GattCharacteristic, GattServer, GattService, NotifyCallback,
    Transport,
};
pub use types::{
    Capabilities, CharacteristicHandle, ConnectionState, DisconnectReason, ServiceHandle,
    TelemetryFrame,
};
