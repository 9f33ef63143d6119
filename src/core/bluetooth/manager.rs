//! Peripheral manager
//! Ties one descriptor to its session, ingestor, poller and command facade,
//! and runs the per-profile setup after a connection succeeds.

use std::sync::Arc;

use futures_util::FutureExt;
use log::{error, info, warn};

use crate::config::ExtensionConfig;
use crate::core::bluetooth::commands::CommandFacade;
use crate::core::bluetooth::connection::PeripheralSession;
use crate::core::bluetooth::constants::{
    ACCEL1_SETTINGS, ACCEL2_SETTINGS, ACCEL_THRESHOLD, SENSOR_STREAM_START,
};
use crate::core::bluetooth::device::{PeripheralDescriptor, PeripheralKind};
use crate::core::bluetooth::directory::names;
use crate::core::bluetooth::notification::{TelemetryIngestor, TelemetryReading};
use crate::core::bluetooth::poller::Poller;
use crate::core::bluetooth::transport::Transport;
use crate::core::codec::{Accelerometer, CommandMessage, ConfigTarget, SensorKind};
use crate::error::PeripheralError;
use crate::host::{HostBridge, HostEvent};

/// Writes that arm the sensor ball's accelerometers and start its stream.
pub fn sensor_ball_setup() -> [CommandMessage; 5] {
    [
        CommandMessage::SensorConfig {
            target: ConfigTarget::Accelerometer(Accelerometer::First),
            value: ACCEL1_SETTINGS,
        },
        CommandMessage::ThresholdConfig {
            accelerometer: Accelerometer::First,
            threshold: ACCEL_THRESHOLD,
        },
        CommandMessage::SensorConfig {
            target: ConfigTarget::Accelerometer(Accelerometer::Second),
            value: ACCEL2_SETTINGS,
        },
        CommandMessage::ThresholdConfig {
            accelerometer: Accelerometer::Second,
            threshold: ACCEL_THRESHOLD,
        },
        CommandMessage::SensorConfig {
            target: ConfigTarget::SensorStream,
            value: SENSOR_STREAM_START,
        },
    ]
}

pub struct PeripheralManager {
    descriptor: PeripheralDescriptor,
    config: ExtensionConfig,
    session: PeripheralSession,
    poller: Poller,
    facade: CommandFacade<PeripheralSession>,
}

impl PeripheralManager {
    pub fn new(
        descriptor: PeripheralDescriptor,
        transport: Arc<dyn Transport>,
        host: Arc<dyn HostBridge>,
        config: ExtensionConfig,
    ) -> Self {
        let ingestor = Arc::new(TelemetryIngestor::new(
            config.telemetry.decoder(),
            config.telemetry.history_depth,
        ));
        let extension_id = descriptor.extension_id;
        let reading_host = host.clone();
        ingestor.subscribe(Arc::new(move |reading: &TelemetryReading| {
            reading_host.emit(HostEvent::Reading {
                extension_id,
                reading: reading.value.clone(),
            });
        }));

        let session = PeripheralSession::new(extension_id, transport, host.clone(), ingestor);
        if descriptor.kind == PeripheralKind::DrawingRobot {
            let weak = session.downgrade();
            host.register_stop_all(Arc::new(move || {
                let weak = weak.clone();
                async move {
                    if let Some(session) = weak.upgrade() {
                        bring_robot_to_rest(&CommandFacade::new(session)).await;
                    }
                }
                .boxed()
            }));
        }
        Self {
            poller: Poller::new(session.clone()),
            facade: CommandFacade::new(session.clone()),
            descriptor,
            config,
            session,
        }
    }

    pub fn extension_id(&self) -> &'static str {
        self.descriptor.extension_id
    }

    pub fn descriptor(&self) -> &PeripheralDescriptor {
        &self.descriptor
    }

    pub fn session(&self) -> &PeripheralSession {
        &self.session
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub fn facade(&self) -> &CommandFacade<PeripheralSession> {
        &self.facade
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Connects and runs the profile's setup.
    ///
    /// Setup steps that fail are logged; the connection stays up.
    pub async fn connect(&self) -> Result<(), PeripheralError> {
        self.session.connect(&self.descriptor).await?;
        if self.descriptor.kind == PeripheralKind::SensorBall {
            self.start_sensor_ball().await;
        }
        Ok(())
    }

    async fn start_sensor_ball(&self) {
        info!("Configuring accelerometers and starting the sensor stream");
        for command in sensor_ball_setup() {
            if let Err(e) = self.session.send(&command).await {
                warn!("Sensor ball setup step {:?} failed: {}", command, e);
            }
        }

        let poll = &self.config.poll;
        if let Err(e) = self
            .poller
            .schedule(names::CAPACITOR_VOLTAGE, poll.interval(), poll.max_retries)
        {
            error!("Failed to start capacitor polling: {}", e);
        }
    }

    pub async fn disconnect(&self) {
        self.poller.cancel_all();
        self.session.disconnect().await;
    }

    /// Brings the peripheral to rest. Only the robot has anything to stop.
    pub async fn stop_all(&self) {
        if self.descriptor.kind == PeripheralKind::DrawingRobot {
            bring_robot_to_rest(&self.facade).await;
        }
    }

    pub fn latest(&self, kind: SensorKind) -> Result<TelemetryReading, PeripheralError> {
        self.session.ingestor().latest(kind)
    }
}

async fn bring_robot_to_rest(facade: &CommandFacade<PeripheralSession>) {
    if facade.sender().is_connected() {
        facade.reset().await;
    }
}
