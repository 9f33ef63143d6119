//! Peripheral descriptors
//! Static description of each supported peripheral: how it advertises and
//! which attributes a session must resolve before it counts as connected.

use uuid::Uuid;

use crate::core::bluetooth::constants::{
    GAMEBALL_EXTENSION_ID, GAMEBALL_NAME_PREFIX, ROBOT_EXTENSION_ID, ROBOT_NAME_PREFIX,
    UUID_DEVICE_INFORMATION_SERVICE, UUID_GENERIC_ACCESS_SERVICE, UUID_GENERIC_ATTRIBUTE_SERVICE,
};
use crate::core::bluetooth::directory::{names, DIRECTORY};

/// Which peripheral family a descriptor belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeripheralKind {
    DrawingRobot,
    SensorBall,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralDescriptor {
    pub kind: PeripheralKind,
    /// Stable identifier the host registers the peripheral under
    pub extension_id: &'static str,
    pub name_prefix: &'static str,
    /// Characteristics whose absence fails the connection
    pub required: &'static [&'static str],
    /// Characteristics resolved when present
    pub optional: &'static [&'static str],
    /// Extra services the transport must be allowed to access
    pub extra_services: &'static [Uuid],
}

impl PeripheralDescriptor {
    pub fn drawing_robot() -> Self {
        Self {
            kind: PeripheralKind::DrawingRobot,
            extension_id: ROBOT_EXTENSION_ID,
            name_prefix: ROBOT_NAME_PREFIX,
            required: &[names::UART_TX, names::UART_RX],
            optional: &[],
            extra_services: &[],
        }
    }

    pub fn sensor_ball() -> Self {
        Self {
            kind: PeripheralKind::SensorBall,
            extension_id: GAMEBALL_EXTENSION_ID,
            name_prefix: GAMEBALL_NAME_PREFIX,
            required: &[
                names::DEVICE_REFRESH_GATT,
                names::ACCEL1_CONFIG,
                names::ACCEL1_THRESHOLD,
                names::ACCEL2_CONFIG,
                names::ACCEL2_THRESHOLD,
                names::SENSOR_STREAM_CONFIG,
                names::SENSOR_STREAM_DATA,
                names::CAPACITOR_VOLTAGE,
            ],
            optional: &[
                names::ACCEL1_DATA,
                names::ACCEL2_DATA,
                names::CAPACITOR_CHARGING,
            ],
            extra_services: &[
                UUID_GENERIC_ACCESS_SERVICE,
                UUID_GENERIC_ATTRIBUTE_SERVICE,
                UUID_DEVICE_INFORMATION_SERVICE,
            ],
        }
    }

    pub fn matches(&self, advertised_name: &str) -> bool {
        advertised_name.starts_with(self.name_prefix)
    }

    /// Services owning the required and optional characteristics, deduplicated.
    pub fn services(&self) -> Vec<Uuid> {
        let mut services: Vec<Uuid> = Vec::new();
        for name in self.required.iter().chain(self.optional) {
            if let Ok((service, _)) = DIRECTORY.resolve(name) {
                if !services.contains(&service) {
                    services.push(service);
                }
            }
        }
        services
    }

    /// Every service id the transport should be asked for.
    pub fn requested_services(&self) -> Vec<Uuid> {
        let mut services = self.services();
        services.extend(self.extra_services.iter().copied());
        services
    }
}
