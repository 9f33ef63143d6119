//! Inbound notification decoding
//! Each characteristic maps to a fixed little-endian frame layout. Decoding
//! never mutates the payload, it only produces a new reading.

use uuid::Uuid;

use super::command::{tuple_fields, Accelerometer};
use crate::core::bluetooth::constants::{
    UUID_ACCEL1_DATA, UUID_ACCEL2_DATA, UUID_CAPACITOR_CHARGING, UUID_CAPACITOR_VOLTAGE,
    UUID_SENSOR_STREAM_DATA, UUID_UART_RX_CHAR,
};
use crate::error::DecodeError;

/// Width of one sample in the sensor-ball frames
const SAMPLE_WIDTH: usize = 2;

/// Sensors the robot reports over its UART, keyed by protocol code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum RobotSensor {
    Bumpers,
    Distance,
    Altimeter,
    Accelerometer,
    Magnetometer,
    Gyroscope,
    ColorSensor,
    Temperature,
    Humidity,
    Pressure,
}

impl RobotSensor {
    pub const ALL: [RobotSensor; 10] = [
        RobotSensor::Bumpers,
        RobotSensor::Distance,
        RobotSensor::Altimeter,
        RobotSensor::Accelerometer,
        RobotSensor::Magnetometer,
        RobotSensor::Gyroscope,
        RobotSensor::ColorSensor,
        RobotSensor::Temperature,
        RobotSensor::Humidity,
        RobotSensor::Pressure,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Self::Bumpers => "b",
            Self::Distance => "d",
            Self::Altimeter => "u",
            Self::Accelerometer => "x",
            Self::Magnetometer => "o",
            Self::Gyroscope => "g",
            Self::ColorSensor => "l",
            Self::Temperature => "t",
            Self::Humidity => "h",
            Self::Pressure => "p",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|sensor| sensor.code() == code)
    }
}

/// Key under which readings are buffered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum SensorKind {
    Accelerometer(Accelerometer),
    CapacitorVoltage,
    CapacitorCharging,
    SampleStream,
    Robot(RobotSensor),
}

/// A typed value decoded from exactly one frame
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum DecodedReading {
    Accelerometer {
        accelerometer: Accelerometer,
        x: u16,
        y: u16,
        z: u16,
    },
    CapacitorVoltage {
        raw: u16,
        volts: f64,
    },
    SensorByte {
        kind: SensorKind,
        value: u8,
    },
    /// Variable-length gameplay samples
    SampleStream {
        samples: Vec<u16>,
    },
    Robot {
        sensor: RobotSensor,
        values: Vec<f64>,
    },
}

impl DecodedReading {
    pub fn kind(&self) -> SensorKind {
        match self {
            Self::Accelerometer { accelerometer, .. } => SensorKind::Accelerometer(*accelerometer),
            Self::CapacitorVoltage { .. } => SensorKind::CapacitorVoltage,
            Self::SensorByte { kind, .. } => *kind,
            Self::SampleStream { .. } => SensorKind::SampleStream,
            Self::Robot { sensor, .. } => SensorKind::Robot(*sensor),
        }
    }
}

/// Frame decoder carrying the calibration constants that are configurable.
#[derive(Debug, Clone, Copy)]
pub struct SensorDecoder {
    /// Volts per raw capacitor count
    capacitor_scale: f64,
}

impl SensorDecoder {
    pub fn new(capacitor_scale: f64) -> Self {
        Self { capacitor_scale }
    }

    pub fn capacitor_scale(&self) -> f64 {
        self.capacitor_scale
    }

    pub fn decode(&self, source: Uuid, payload: &[u8]) -> Result<DecodedReading, DecodeError> {
        match source {
            UUID_ACCEL1_DATA => accelerometer(Accelerometer::First, payload),
            UUID_ACCEL2_DATA => accelerometer(Accelerometer::Second, payload),
            UUID_CAPACITOR_VOLTAGE => {
                let raw = exact_samples(payload, 1)?[0];
                Ok(DecodedReading::CapacitorVoltage {
                    raw,
                    volts: f64::from(raw) * self.capacitor_scale,
                })
            }
            UUID_CAPACITOR_CHARGING => match payload {
                [value] => Ok(DecodedReading::SensorByte {
                    kind: SensorKind::CapacitorCharging,
                    value: *value,
                }),
                _ => Err(DecodeError::LengthMismatch {
                    expected: 1,
                    actual: payload.len(),
                }),
            },
            UUID_SENSOR_STREAM_DATA => {
                let samples = samples(payload)?;
                if samples.is_empty() {
                    return Err(DecodeError::Malformed("empty sample frame".to_string()));
                }
                Ok(DecodedReading::SampleStream { samples })
            }
            UUID_UART_RX_CHAR => robot_text(payload),
            other => Err(DecodeError::UnknownCharacteristic(other)),
        }
    }
}

impl Default for SensorDecoder {
    fn default() -> Self {
        // 12-bit ADC against a 3 V reference
        Self::new(3.0 / 4096.0)
    }
}

/// Decodes with the default calibration.
pub fn decode(source: Uuid, payload: &[u8]) -> Result<DecodedReading, DecodeError> {
    SensorDecoder::default().decode(source, payload)
}

fn samples(payload: &[u8]) -> Result<Vec<u16>, DecodeError> {
    if payload.len() % SAMPLE_WIDTH != 0 {
        return Err(DecodeError::Misaligned {
            len: payload.len(),
            width: SAMPLE_WIDTH,
        });
    }
    Ok(payload
        .chunks_exact(SAMPLE_WIDTH)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

fn exact_samples(payload: &[u8], count: usize) -> Result<Vec<u16>, DecodeError> {
    let values = samples(payload)?;
    if values.len() != count {
        return Err(DecodeError::LengthMismatch {
            expected: count * SAMPLE_WIDTH,
            actual: payload.len(),
        });
    }
    Ok(values)
}

fn accelerometer(accelerometer: Accelerometer, payload: &[u8]) -> Result<DecodedReading, DecodeError> {
    let axes = exact_samples(payload, 3)?;
    Ok(DecodedReading::Accelerometer {
        accelerometer,
        x: axes[0],
        y: axes[1],
        z: axes[2],
    })
}

fn robot_text(payload: &[u8]) -> Result<DecodedReading, DecodeError> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| DecodeError::Malformed(format!("UART frame is not UTF-8: {}", e)))?;
    let fields = tuple_fields(text)?;
    let (code, args) = fields
        .split_first()
        .ok_or_else(|| DecodeError::Malformed(text.to_string()))?;
    let sensor = RobotSensor::from_code(code)
        .ok_or_else(|| DecodeError::UnknownDiscriminator(code.to_string()))?;
    let values = args
        .iter()
        .map(|value| value.parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| DecodeError::Malformed(text.to_string()))?;
    Ok(DecodedReading::Robot { sensor, values })
}
