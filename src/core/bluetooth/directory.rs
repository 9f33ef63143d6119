//! Attribute directory
//! Static bidirectional table between logical attribute names and their
//! service/characteristic identifiers. Safe to share across sessions.

use uuid::Uuid;

use crate::core::bluetooth::constants::*;
use crate::error::PeripheralError;

/// Logical names used by descriptors, the codec targets and the poller
pub mod names {
    pub const UART_TX: &str = "uart_tx";
    pub const UART_RX: &str = "uart_rx";

    pub const ACCEL1_CONFIG: &str = "accelerometer_1_config";
    pub const ACCEL1_THRESHOLD: &str = "accelerometer_1_threshold";
    pub const ACCEL1_DATA: &str = "accelerometer_1_data";
    pub const ACCEL1_ID: &str = "accelerometer_1_id";
    pub const ACCEL2_CONFIG: &str = "accelerometer_2_config";
    pub const ACCEL2_THRESHOLD: &str = "accelerometer_2_threshold";
    pub const ACCEL2_DATA: &str = "accelerometer_2_data";
    pub const ACCEL2_ID: &str = "accelerometer_2_id";
    pub const MAG_COMMAND: &str = "magnetometer_command";
    pub const MAG_DATA: &str = "magnetometer_data";
    pub const MAG_RATE: &str = "magnetometer_rate";
    pub const MAG_ID: &str = "magnetometer_id";
    pub const DEVICE_TEST: &str = "device_test";
    pub const DEVICE_RESET: &str = "device_reset";
    pub const DEVICE_REFRESH_GATT: &str = "device_refresh_gatt";
    pub const DEVICE_NAME: &str = "device_name";
    pub const DEVICE_COLOR: &str = "device_color";
    pub const SENSOR_STREAM_CONFIG: &str = "sensor_stream_config";
    pub const SENSOR_STREAM_DATA: &str = "sensor_stream_data";
    pub const CAPACITOR_VOLTAGE: &str = "capacitor_voltage";
    pub const CAPACITOR_CHARGING: &str = "capacitor_charging";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Service,
    /// `None` when the owning service is not known
    Characteristic { service: Option<Uuid> },
}

#[derive(Debug, Clone, Copy)]
pub struct AttributeEntry {
    pub name: &'static str,
    pub uuid: Uuid,
    pub label: &'static str,
    pub kind: AttributeKind,
}

const fn service(name: &'static str, uuid: Uuid, label: &'static str) -> AttributeEntry {
    AttributeEntry { name, uuid, label, kind: AttributeKind::Service }
}

const fn characteristic(
    name: &'static str,
    uuid: Uuid,
    label: &'static str,
    service: Option<Uuid>,
) -> AttributeEntry {
    AttributeEntry { name, uuid, label, kind: AttributeKind::Characteristic { service } }
}

const ENTRIES: &[AttributeEntry] = &[
    service("uart_service", UUID_UART_SERVICE, "UART Service"),
    characteristic(names::UART_TX, UUID_UART_TX_CHAR, "UART TX", Some(UUID_UART_SERVICE)),
    characteristic(names::UART_RX, UUID_UART_RX_CHAR, "UART RX", Some(UUID_UART_SERVICE)),
    service("generic_access", UUID_GENERIC_ACCESS_SERVICE, "Generic Access"),
    service("generic_attribute", UUID_GENERIC_ATTRIBUTE_SERVICE, "Generic Attribute"),
    service("device_information", UUID_DEVICE_INFORMATION_SERVICE, "Device Information"),
    service("accelerometer_1_service", UUID_ACCEL1_SERVICE, "Accelerometer 1 Service"),
    service("accelerometer_2_service", UUID_ACCEL2_SERVICE, "Accelerometer 2 Service"),
    service("gameball_service", UUID_GAMEBALL_SERVICE, "Gameball Service"),
    service("sensor_stream_service", UUID_SENSOR_STREAM_SERVICE, "Sensor Stream Service"),
    service("capacitor_service", UUID_CAPACITOR_SERVICE, "Capacitor Service"),
    characteristic(names::ACCEL1_CONFIG, UUID_ACCEL1_CONFIG, "accelerometer_1_config", Some(UUID_ACCEL1_SERVICE)),
    characteristic(names::ACCEL1_THRESHOLD, UUID_ACCEL1_THRESHOLD, "accelerometer_1_threshold", Some(UUID_ACCEL1_SERVICE)),
    characteristic(names::ACCEL1_DATA, UUID_ACCEL1_DATA, "accelerometer_1_data", Some(UUID_ACCEL1_SERVICE)),
    characteristic(names::ACCEL1_ID, UUID_ACCEL1_ID, "accelerometer_1_id", Some(UUID_ACCEL1_SERVICE)),
    characteristic(names::ACCEL2_CONFIG, UUID_ACCEL2_CONFIG, "accelerometer_2_config", Some(UUID_ACCEL2_SERVICE)),
    characteristic(names::ACCEL2_THRESHOLD, UUID_ACCEL2_THRESHOLD, "accelerometer_2_threshold", Some(UUID_ACCEL2_SERVICE)),
    characteristic(names::ACCEL2_DATA, UUID_ACCEL2_DATA, "accelerometer_2_data", Some(UUID_ACCEL2_SERVICE)),
    characteristic(names::ACCEL2_ID, UUID_ACCEL2_ID, "accelerometer_2_id", Some(UUID_ACCEL2_SERVICE)),
    characteristic(names::MAG_COMMAND, UUID_MAG_COMMAND, "magnetometer_command", None),
    characteristic(names::MAG_DATA, UUID_MAG_DATA, "magnetometer_data", None),
    characteristic(names::MAG_RATE, UUID_MAG_RATE, "magnetometer_rate", None),
    characteristic(names::MAG_ID, UUID_MAG_ID, "magnetometer_id", None),
    characteristic(names::DEVICE_TEST, UUID_DEVICE_TEST, "device_test", Some(UUID_GAMEBALL_SERVICE)),
    characteristic(names::DEVICE_RESET, UUID_DEVICE_RESET, "device_reset", Some(UUID_GAMEBALL_SERVICE)),
    characteristic(names::DEVICE_REFRESH_GATT, UUID_DEVICE_REFRESH_GATT, "device_refresh_gatt", Some(UUID_GAMEBALL_SERVICE)),
    characteristic(names::DEVICE_NAME, UUID_DEVICE_NAME, "device_name", Some(UUID_GAMEBALL_SERVICE)),
    characteristic(names::DEVICE_COLOR, UUID_DEVICE_COLOR, "device_color", Some(UUID_GAMEBALL_SERVICE)),
    characteristic(names::SENSOR_STREAM_CONFIG, UUID_SENSOR_STREAM_CONFIG, "sensor_stream_config", Some(UUID_SENSOR_STREAM_SERVICE)),
    characteristic(names::SENSOR_STREAM_DATA, UUID_SENSOR_STREAM_DATA, "sensor_stream_data", Some(UUID_SENSOR_STREAM_SERVICE)),
    characteristic(names::CAPACITOR_VOLTAGE, UUID_CAPACITOR_VOLTAGE, "capacitor_voltage", Some(UUID_CAPACITOR_SERVICE)),
    characteristic(names::CAPACITOR_CHARGING, UUID_CAPACITOR_CHARGING, "capacitor_charging", Some(UUID_CAPACITOR_SERVICE)),
];

/// Lookup table over every attribute either peripheral exposes
#[derive(Debug, Clone, Copy)]
pub struct AttributeDirectory {
    entries: &'static [AttributeEntry],
}

/// The process-wide directory
pub static DIRECTORY: AttributeDirectory = AttributeDirectory { entries: ENTRIES };

impl AttributeDirectory {
    pub fn entry(&self, name: &str) -> Option<&'static AttributeEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Resolves a characteristic name to `(service, characteristic)`.
    pub fn resolve(&self, name: &str) -> Result<(Uuid, Uuid), PeripheralError> {
        match self.entry(name).map(|entry| (entry.kind, entry.uuid)) {
            Some((AttributeKind::Characteristic { service: Some(service) }, uuid)) => {
                Ok((service, uuid))
            }
            _ => Err(PeripheralError::UnknownAttribute(name.to_string())),
        }
    }

    /// Logical name for a raw identifier, if any.
    pub fn name_of(&self, uuid: Uuid) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|entry| entry.uuid == uuid)
            .map(|entry| entry.name)
    }

    /// Human-readable label for diagnostics.
    pub fn describe(&self, uuid: Uuid) -> &'static str {
        self.entries
            .iter()
            .find(|entry| entry.uuid == uuid)
            .map(|entry| entry.label)
            .unwrap_or("Unknown")
    }
}
