use serde::{Deserialize, Serialize};

use crate::core::codec::SensorDecoder;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Readings kept per sensor kind. 1 keeps only the latest.
    pub history_depth: usize,

    /// Capacitor volts per raw count, as numerator / denominator.
    /// 3 / 4096 matches a 12-bit ADC against a 3 V reference.
    pub capacitor_scale_numerator: f64,
    pub capacitor_scale_denominator: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            history_depth: 1,
            capacitor_scale_numerator: 3.0,
            capacitor_scale_denominator: 4096.0,
        }
    }
}

impl TelemetryConfig {
    pub fn capacitor_scale(&self) -> f64 {
        if self.capacitor_scale_denominator == 0.0 {
            log::warn!("Capacitor scale denominator is 0, using the default scale");
            return SensorDecoder::default().capacitor_scale();
        }
        self.capacitor_scale_numerator / self.capacitor_scale_denominator
    }

    pub fn decoder(&self) -> SensorDecoder {
        SensorDecoder::new(self.capacitor_scale())
    }
}
