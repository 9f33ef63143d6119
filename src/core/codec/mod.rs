//! Wire codec
//! Pure translation between structured commands and bytes, and between
//! notification payloads and typed sensor readings. No I/O, no state.

mod command;
mod sensor;

pub use command::{
    encode, parse_command, Accelerometer, CommandMessage, ConfigTarget, Direction, Face,
    PenPosition, PIXEL_COUNT,
};
pub use sensor::{decode, DecodedReading, RobotSensor, SensorDecoder, SensorKind};
