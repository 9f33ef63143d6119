//! Constants used throughout the session layer
//! This module contains the 128-bit identifiers of both peripherals,
//! their advertised names, and timing defaults.

use uuid::Uuid;

/// Advertised name prefix of the drawing robot
pub const ROBOT_NAME_PREFIX: &str = "Bluefruit52";

/// Advertised name prefix of the sensor ball
pub const GAMEBALL_NAME_PREFIX: &str = "Gameball";

/// Stable host identifiers
pub const ROBOT_EXTENSION_ID: &str = "doodlebot";
pub const GAMEBALL_EXTENSION_ID: &str = "playimpossibleData";

/// Nordic UART service used by the robot
pub const UUID_UART_SERVICE: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);
/// Host -> robot
pub const UUID_UART_TX_CHAR: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);
/// Robot -> host
pub const UUID_UART_RX_CHAR: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Standard Bluetooth Service UUIDs
pub const UUID_GENERIC_ACCESS_SERVICE: Uuid = Uuid::from_u128(0x00001800_0000_1000_8000_00805f9b34fb);
pub const UUID_GENERIC_ATTRIBUTE_SERVICE: Uuid = Uuid::from_u128(0x00001801_0000_1000_8000_00805f9b34fb);
pub const UUID_DEVICE_INFORMATION_SERVICE: Uuid = Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);

/// Sensor ball services
pub const UUID_ACCEL1_SERVICE: Uuid = Uuid::from_u128(0xc75ea010_ede4_4ab4_8f96_17699ebaf1b8);
pub const UUID_ACCEL2_SERVICE: Uuid = Uuid::from_u128(0xd75ea010_ede4_4ab4_8f96_17699ebaf1b8);
pub const UUID_GAMEBALL_SERVICE: Uuid = Uuid::from_u128(0x00766963_6172_6173_6f6c_7574696f6e73);
pub const UUID_SENSOR_STREAM_SERVICE: Uuid = Uuid::from_u128(0xa54d785d_d674_4cda_b794_ca049d4e044b);
pub const UUID_CAPACITOR_SERVICE: Uuid = Uuid::from_u128(0xf4ad0000_d674_4cda_b794_ca049d4e044b);

/// Sensor ball characteristics
pub const UUID_ACCEL1_CONFIG: Uuid = Uuid::from_u128(0x1006bd26_daad_11e5_b5d2_0a1d41d68578);
pub const UUID_ACCEL1_THRESHOLD: Uuid = Uuid::from_u128(0x1006bd28_daad_11e5_b5d2_0a1d41d68578);
pub const UUID_ACCEL1_DATA: Uuid = Uuid::from_u128(0x1006bfd8_daad_11e5_b5d2_0a1d41d68578);
pub const UUID_ACCEL1_ID: Uuid = Uuid::from_u128(0xbb64a6c3_3484_4479_abd2_46dff5bfc574);
pub const UUID_ACCEL2_CONFIG: Uuid = Uuid::from_u128(0x8f20fa52_dab9_11e5_b5d2_0a1d41d68578);
pub const UUID_ACCEL2_THRESHOLD: Uuid = Uuid::from_u128(0x8f20fa54_dab9_11e5_b5d2_0a1d41d68578);
pub const UUID_ACCEL2_DATA: Uuid = Uuid::from_u128(0x8f20fcaa_dab9_11e5_b5d2_0a1d41d68578);
pub const UUID_ACCEL2_ID: Uuid = Uuid::from_u128(0xa93d70c9_ed5d_4af1_b0ad_518176309dfb);
pub const UUID_MAG_COMMAND: Uuid = Uuid::from_u128(0x31696178_3630_4892_adf1_19a7437d052a);
pub const UUID_MAG_DATA: Uuid = Uuid::from_u128(0x042eb337_d510_4ee7_943a_baeaa50b0d9e);
pub const UUID_MAG_RATE: Uuid = Uuid::from_u128(0x08588aac_e32e_4395_ab71_6508d9d00329);
pub const UUID_MAG_ID: Uuid = Uuid::from_u128(0xea1c2a4b_543c_4275_9cbe_890024d777eb);
pub const UUID_DEVICE_TEST: Uuid = Uuid::from_u128(0x8e894cbc_f3f8_4e6b_9a0b_7247598552ac);
pub const UUID_DEVICE_RESET: Uuid = Uuid::from_u128(0x01766963_6172_6173_6f6c_7574696f6e73);
pub const UUID_DEVICE_REFRESH_GATT: Uuid = Uuid::from_u128(0x0d42d5d8_6727_4547_9a82_2fa4d4f331bd);
pub const UUID_DEVICE_NAME: Uuid = Uuid::from_u128(0x7c019ff3_e008_4268_b6f7_8043adbb8c22);
pub const UUID_DEVICE_COLOR: Uuid = Uuid::from_u128(0x822ec8e4_4d57_4e93_9fa7_d47ae7e941c0);
pub const UUID_SENSOR_STREAM_CONFIG: Uuid = Uuid::from_u128(0xa54d785d_d675_4cda_b794_ca049d4e044b);
pub const UUID_SENSOR_STREAM_DATA: Uuid = Uuid::from_u128(0xa54d785d_d676_4cda_b794_ca049d4e044b);
pub const UUID_CAPACITOR_VOLTAGE: Uuid = Uuid::from_u128(0xf4ad0001_d675_4cda_b794_ca049d4e044b);
pub const UUID_CAPACITOR_CHARGING: Uuid = Uuid::from_u128(0xa59c6ade_5427_4afb_bfe4_74b21b7893a0);

/// Accelerometer settings written after connecting (low byte of 0x197 / 0x647)
pub const ACCEL1_SETTINGS: u8 = 0x97;
pub const ACCEL2_SETTINGS: u8 = 0x47;

/// Accelerometer wake threshold written after connecting
pub const ACCEL_THRESHOLD: u16 = 135;

/// Sensor stream mode that starts gameplay sampling
pub const SENSOR_STREAM_START: u8 = 3;

/// Default interval between capacitor voltage reads in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;

/// Default number of consecutive failed reads before a poll stops
pub const DEFAULT_POLL_MAX_RETRIES: u32 = 3;

/// Default scan window in seconds
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 10;
