//! Telemetry ingestion
//! Decodes every frame the session hands over, keeps the most recent readings
//! per sensor kind and fans them out to observers in arrival order.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use uuid::Uuid;

use crate::core::bluetooth::directory::DIRECTORY;
use crate::core::bluetooth::types::TelemetryFrame;
use crate::core::codec::{DecodedReading, SensorDecoder, SensorKind};
use crate::error::PeripheralError;

/// Called synchronously for every successfully decoded frame.
pub type ReadingObserver = Arc<dyn Fn(&TelemetryReading) + Send + Sync>;

/// A decoded value together with the frame metadata it came from
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryReading {
    pub sequence: u64,
    pub source: Uuid,
    pub received_at: DateTime<Utc>,
    pub value: DecodedReading,
}

pub struct TelemetryIngestor {
    decoder: SensorDecoder,
    /// Readings retained per sensor kind
    depth: usize,
    readings: Mutex<HashMap<SensorKind, VecDeque<TelemetryReading>>>,
    observers: Mutex<Vec<ReadingObserver>>,
    /// Serializes delivery so observers see frames in arrival order
    delivery: Mutex<()>,
    dropped: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TelemetryIngestor {
    pub fn new(decoder: SensorDecoder, depth: usize) -> Self {
        Self {
            decoder,
            depth: depth.max(1),
            readings: Mutex::new(HashMap::new()),
            observers: Mutex::new(Vec::new()),
            delivery: Mutex::new(()),
            dropped: AtomicU64::new(0),
        }
    }

    /// Decodes and stores one frame. Malformed frames are counted and dropped.
    pub fn on_frame(&self, frame: &TelemetryFrame) {
        let _ordered = lock(&self.delivery);

        let value = match self.decoder.decode(frame.source(), frame.payload()) {
            Ok(value) => value,
            Err(e) => {
                let dropped = self.dropped.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(
                    "Dropping frame #{} from {}: {} ({} dropped so far)",
                    frame.sequence(),
                    DIRECTORY.describe(frame.source()),
                    e,
                    dropped
                );
                return;
            }
        };

        let reading = TelemetryReading {
            sequence: frame.sequence(),
            source: frame.source(),
            received_at: frame.received_at(),
            value,
        };
        debug!("Decoded frame #{}: {:?}", reading.sequence, reading.value);

        {
            let mut readings = lock(&self.readings);
            let buffer = readings.entry(reading.value.kind()).or_default();
            buffer.push_back(reading.clone());
            while buffer.len() > self.depth {
                buffer.pop_front();
            }
        }

        let observers = lock(&self.observers).clone();
        for observer in observers {
            observer(&reading);
        }
    }

    /// Most recent reading for `kind`.
    pub fn latest(&self, kind: SensorKind) -> Result<TelemetryReading, PeripheralError> {
        lock(&self.readings)
            .get(&kind)
            .and_then(|buffer| buffer.back().cloned())
            .ok_or(PeripheralError::NoData(kind))
    }

    /// Buffered readings for `kind`, oldest first.
    pub fn history(&self, kind: SensorKind) -> Vec<TelemetryReading> {
        lock(&self.readings)
            .get(&kind)
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscribe(&self, observer: ReadingObserver) {
        lock(&self.observers).push(observer);
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl Default for TelemetryIngestor {
    fn default() -> Self {
        Self::new(SensorDecoder::default(), 1)
    }
}
