//! Peripheral session
//! This module owns one connection's lifecycle: requesting the device,
//! discovering services, subscribing, sending, reading and tearing down.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::device::PeripheralDescriptor;
use crate::core::bluetooth::directory::{names, DIRECTORY};
use crate::core::bluetooth::notification::TelemetryIngestor;
use crate::core::bluetooth::transport::{DeviceLink, Transport};
use crate::core::bluetooth::types::{
    CharacteristicHandle, ConnectionState, DisconnectReason, DisconnectSubscription,
    NotificationSubscription, ServiceHandle, TelemetryFrame, Validity,
};
use crate::core::codec::{self, Accelerometer, CommandMessage, ConfigTarget};
use crate::error::{ErrorCategory, PeripheralError};
use crate::host::{HostBridge, HostEvent};

/// Characteristic a command is written to.
pub fn command_target(message: &CommandMessage) -> &'static str {
    match message {
        CommandMessage::SensorConfig { target, .. } => match target {
            ConfigTarget::Accelerometer(Accelerometer::First) => names::ACCEL1_CONFIG,
            ConfigTarget::Accelerometer(Accelerometer::Second) => names::ACCEL2_CONFIG,
            ConfigTarget::SensorStream => names::SENSOR_STREAM_CONFIG,
        },
        CommandMessage::ThresholdConfig { accelerometer, .. } => match accelerometer {
            Accelerometer::First => names::ACCEL1_THRESHOLD,
            Accelerometer::Second => names::ACCEL2_THRESHOLD,
        },
        _ => names::UART_TX,
    }
}

/// Everything acquired for one connection. Released as a unit.
struct ActiveLink {
    device: Arc<dyn DeviceLink>,
    validity: Validity,
    /// Cancelled when the link goes away; pollers hang child tokens off it
    lifetime: CancellationToken,
    services: HashMap<Uuid, ServiceHandle>,
    handles: HashMap<&'static str, CharacteristicHandle>,
    subscriptions: Vec<NotificationSubscription>,
    disconnect_listener: Option<DisconnectSubscription>,
}

impl ActiveLink {
    fn new(device: Arc<dyn DeviceLink>) -> Self {
        Self {
            device,
            validity: Validity::new(),
            lifetime: CancellationToken::new(),
            services: HashMap::new(),
            handles: HashMap::new(),
            subscriptions: Vec::new(),
            disconnect_listener: None,
        }
    }

    /// Marks every handle dead and stops timers tied to this link.
    fn invalidate(&self) {
        self.validity.invalidate();
        self.lifetime.cancel();
    }

    /// Drops listeners and hands back the device for transport teardown.
    fn release(self) -> Arc<dyn DeviceLink> {
        let ActiveLink {
            device,
            validity,
            lifetime,
            subscriptions,
            disconnect_listener,
            ..
        } = self;
        validity.invalidate();
        lifetime.cancel();
        drop(subscriptions);
        drop(disconnect_listener);
        device
    }
}

struct SessionInner {
    state: ConnectionState,
    /// Bumped on every connect attempt; stale callbacks compare against it
    generation: u64,
    attempt: CancellationToken,
    /// Set when the link drops while an attempt is still in flight
    abort_reason: Option<PeripheralError>,
    link: Option<ActiveLink>,
    /// Failure categories already shown to the user since the last success
    reported: HashSet<ErrorCategory>,
}

impl SessionInner {
    fn set_state(&mut self, extension_id: &str, next: ConnectionState) {
        if self.state != next {
            info!("[{}] {:?} -> {:?}", extension_id, self.state, next);
            self.state = next;
        }
    }
}

struct SessionShared {
    extension_id: &'static str,
    transport: Arc<dyn Transport>,
    host: Arc<dyn HostBridge>,
    ingestor: Arc<TelemetryIngestor>,
    sequence: AtomicU64,
    inner: Mutex<SessionInner>,
    /// Held while a status transition and its host event happen together
    events: Mutex<()>,
}

/// Handle to a session; clones share the same connection.
#[derive(Clone)]
pub struct PeripheralSession {
    shared: Arc<SessionShared>,
}

/// Non-owning handle, for callbacks the host keeps around.
#[derive(Clone)]
pub struct WeakSession {
    shared: Weak<SessionShared>,
}

impl WeakSession {
    pub fn upgrade(&self) -> Option<PeripheralSession> {
        self.shared.upgrade().map(|shared| PeripheralSession { shared })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PeripheralSession {
    pub fn new(
        extension_id: &'static str,
        transport: Arc<dyn Transport>,
        host: Arc<dyn HostBridge>,
        ingestor: Arc<TelemetryIngestor>,
    ) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                extension_id,
                transport,
                host,
                ingestor,
                sequence: AtomicU64::new(0),
                inner: Mutex::new(SessionInner {
                    state: ConnectionState::Disconnected,
                    generation: 0,
                    attempt: CancellationToken::new(),
                    abort_reason: None,
                    link: None,
                    reported: HashSet::new(),
                }),
                events: Mutex::new(()),
            }),
        }
    }

    pub fn extension_id(&self) -> &'static str {
        self.shared.extension_id
    }

    pub fn downgrade(&self) -> WeakSession {
        WeakSession { shared: Arc::downgrade(&self.shared) }
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.shared.inner).state.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn ingestor(&self) -> &Arc<TelemetryIngestor> {
        &self.shared.ingestor
    }

    /// Handle for a resolved characteristic of the current link, if any.
    pub fn handle(&self, name: &str) -> Option<CharacteristicHandle> {
        lock(&self.shared.inner)
            .link
            .as_ref()
            .and_then(|link| link.handles.get(name).cloned())
    }

    /// Handle for a discovered service of the current link, if any.
    pub fn service(&self, id: Uuid) -> Option<ServiceHandle> {
        lock(&self.shared.inner)
            .link
            .as_ref()
            .and_then(|link| link.services.get(&id).cloned())
    }

    /// Connects to the first device matching `descriptor`.
    ///
    /// Only valid from `Disconnected` or `Failed`; a second call while an
    /// attempt is in flight fails with `Busy`.
    pub async fn connect(&self, descriptor: &PeripheralDescriptor) -> Result<(), PeripheralError> {
        let shared = &self.shared;
        let (generation, attempt) = {
            let mut inner = lock(&shared.inner);
            if inner.state == ConnectionState::Connected {
                return Err(PeripheralError::AlreadyConnected);
            }
            if !inner.state.can_connect() {
                warn!(
                    "[{}] Connect requested while {:?}, rejecting",
                    shared.extension_id, inner.state
                );
                return Err(PeripheralError::Busy);
            }
            inner.generation += 1;
            inner.attempt = CancellationToken::new();
            inner.abort_reason = None;
            inner.set_state(shared.extension_id, ConnectionState::Connecting);
            (inner.generation, inner.attempt.clone())
        };

        info!(
            "[{}] Requesting device with name prefix {:?}",
            shared.extension_id, descriptor.name_prefix
        );
        let mut acquired: Option<Arc<dyn DeviceLink>> = None;
        let result = tokio::select! {
            result = shared.establish(descriptor, generation, &mut acquired) => result,
            _ = attempt.cancelled() => Err(PeripheralError::Cancelled),
        };

        match result {
            Ok(()) => {
                info!("[{}] Connection and setup process completed successfully", shared.extension_id);
                Ok(())
            }
            Err(err) => {
                // A link taken by `disconnect` or `connection_lost` is torn down there
                let (err, released) = shared.fail_attempt(generation, err);
                if let Some(device) = released.or(acquired) {
                    if let Err(e) = device.disconnect().await {
                        warn!("[{}] Failed to release device after error: {}", shared.extension_id, e);
                    }
                }
                Err(err)
            }
        }
    }

    /// Tears down the link from any state. Always ends in `Disconnected`.
    pub async fn disconnect(&self) {
        let shared = &self.shared;
        let (link, was_connected) = {
            let mut inner = lock(&shared.inner);
            match inner.state {
                ConnectionState::Disconnected | ConnectionState::Disconnecting => {
                    debug!("[{}] Disconnect requested while {:?}", shared.extension_id, inner.state);
                    return;
                }
                _ => {}
            }
            let was_connected = inner.state == ConnectionState::Connected;
            inner.attempt.cancel();
            let link = inner.link.take();
            if let Some(link) = &link {
                link.invalidate();
            }
            inner.set_state(shared.extension_id, ConnectionState::Disconnecting);
            (link, was_connected)
        };

        if let Some(link) = link {
            let device = link.release();
            info!("[{}] Disconnecting from device {}", shared.extension_id, device.id());
            if let Err(e) = device.disconnect().await {
                warn!("[{}] Transport teardown failed: {}", shared.extension_id, e);
            }
        }

        let _events = lock(&shared.events);
        {
            let mut inner = lock(&shared.inner);
            if inner.state == ConnectionState::Disconnecting {
                inner.set_state(shared.extension_id, ConnectionState::Disconnected);
            }
        }
        if was_connected {
            shared.host.emit(HostEvent::Disconnected {
                extension_id: shared.extension_id,
                reason: DisconnectReason::Requested,
            });
        }
    }

    /// Encodes and writes a command to the characteristic it targets.
    pub async fn send(&self, message: &CommandMessage) -> Result<(), PeripheralError> {
        let bytes = codec::encode(message)?;
        let handle = self.connected_handle(command_target(message))?;
        debug!("[{}] Sending {:?} to {}", self.shared.extension_id, message, handle.name());
        handle.write(&bytes).await.map_err(|e| {
            warn!("[{}] Write to {} failed: {}", self.shared.extension_id, handle.name(), e);
            e
        })
    }

    /// Reads the raw value of a characteristic.
    pub async fn read(&self, name: &str) -> Result<Vec<u8>, PeripheralError> {
        let handle = self.connected_handle(name)?;
        handle.read().await
    }

    /// Feeds a read result into the same path notifications take.
    pub fn ingest(&self, source: Uuid, payload: Vec<u8>) {
        let generation = lock(&self.shared.inner).generation;
        self.shared.ingest(generation, source, payload);
    }

    /// Child token cancelled when the current connection goes away.
    pub fn connection_token(&self) -> Result<CancellationToken, PeripheralError> {
        let inner = lock(&self.shared.inner);
        match (&inner.state, &inner.link) {
            (ConnectionState::Connected, Some(link)) => Ok(link.lifetime.child_token()),
            _ => Err(PeripheralError::NotConnected),
        }
    }

    fn connected_handle(&self, name: &str) -> Result<CharacteristicHandle, PeripheralError> {
        let inner = lock(&self.shared.inner);
        match (&inner.state, &inner.link) {
            (ConnectionState::Connected, Some(link)) => link
                .handles
                .get(name)
                .cloned()
                .ok_or_else(|| PeripheralError::UnknownAttribute(name.to_string())),
            _ => Err(PeripheralError::NotConnected),
        }
    }
}

impl SessionShared {
    async fn establish(
        self: &Arc<Self>,
        descriptor: &PeripheralDescriptor,
        generation: u64,
        acquired: &mut Option<Arc<dyn DeviceLink>>,
    ) -> Result<(), PeripheralError> {
        let device = self
            .transport
            .request_device(descriptor.name_prefix, &descriptor.requested_services())
            .await?;
        *acquired = Some(device.clone());
        info!(
            "[{}] Device details - ID: {}, Name: {:?}",
            self.extension_id,
            device.id(),
            device.name()
        );
        self.attach(generation, ActiveLink::new(device.clone()))?;
        *acquired = None;

        info!("[{}] Initiating connection to {}...", self.extension_id, device.id());
        let server = device.connect().await?;
        let weak = Arc::downgrade(self);
        device.on_disconnected(Arc::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.connection_lost(generation);
            }
        }));
        let listener = DisconnectSubscription::new(device.clone());
        self.advance(generation, ConnectionState::DiscoveringServices, move |link| {
            link.disconnect_listener = Some(listener);
        })?;

        info!("[{}] Connection successful, discovering services...", self.extension_id);
        let validity = self.link_validity(generation)?;
        let mut services: HashMap<Uuid, ServiceHandle> = HashMap::new();
        let mut handles: HashMap<&'static str, CharacteristicHandle> = HashMap::new();
        let wanted = descriptor
            .required
            .iter()
            .map(|name| (*name, true))
            .chain(descriptor.optional.iter().map(|name| (*name, false)));

        for (name, required) in wanted {
            let (service_id, characteristic_id) = DIRECTORY.resolve(name)?;
            let service = match services.get(&service_id).cloned() {
                Some(service) => service,
                None => match server.get_service(service_id).await {
                    Ok(service) => {
                        info!(
                            "[{}] Found service {} ({})",
                            self.extension_id,
                            DIRECTORY.describe(service_id),
                            service_id
                        );
                        let handle = ServiceHandle { service, validity: validity.clone() };
                        services.insert(service_id, handle.clone());
                        handle
                    }
                    Err(e) if !required => {
                        info!("[{}] Optional {} unavailable: {}", self.extension_id, name, e);
                        continue;
                    }
                    Err(e) => return Err(e),
                },
            };

            match service.service.get_characteristic(characteristic_id).await {
                Ok(characteristic) => {
                    let capabilities = characteristic.capabilities();
                    debug!(
                        "[{}] Found characteristic {} {:?}",
                        self.extension_id,
                        DIRECTORY.describe(characteristic_id),
                        capabilities
                    );
                    handles.insert(
                        name,
                        CharacteristicHandle {
                            name,
                            service: service_id,
                            characteristic,
                            capabilities,
                            validity: validity.clone(),
                        },
                    );
                }
                Err(e) if !required => {
                    info!("[{}] Optional {} unavailable: {}", self.extension_id, name, e);
                }
                Err(e) => return Err(e),
            }
        }

        let notifiable: Vec<CharacteristicHandle> = handles
            .values()
            .filter(|handle| handle.capabilities.notifiable)
            .cloned()
            .collect();
        self.advance(generation, ConnectionState::Subscribing, move |link| {
            link.services = services;
            link.handles = handles;
        })?;

        for handle in notifiable {
            info!("[{}] Subscribing to {}...", self.extension_id, handle.name());
            let weak = Arc::downgrade(self);
            let source = handle.uuid();
            // Created first so an abandoned or failed subscribe still unsubscribes
            let subscription = NotificationSubscription::new(handle.characteristic.clone());
            handle
                .characteristic
                .subscribe(Arc::new(move |payload: Vec<u8>| {
                    if let Some(shared) = weak.upgrade() {
                        shared.ingest(generation, source, payload);
                    }
                }))
                .await?;
            self.advance(generation, ConnectionState::Subscribing, move |link| {
                link.subscriptions.push(subscription);
            })?;
        }

        self.commit(generation)
    }

    /// Stores the freshly requested device as the pending link.
    fn attach(&self, generation: u64, link: ActiveLink) -> Result<(), PeripheralError> {
        let mut inner = lock(&self.inner);
        if inner.generation != generation || inner.state != ConnectionState::Connecting {
            return Err(PeripheralError::Cancelled);
        }
        inner.link = Some(link);
        Ok(())
    }

    fn link_validity(&self, generation: u64) -> Result<Validity, PeripheralError> {
        let inner = lock(&self.inner);
        match &inner.link {
            Some(link) if inner.generation == generation => Ok(link.validity.clone()),
            _ => Err(PeripheralError::Cancelled),
        }
    }

    /// Moves an in-flight attempt forward, unless it was cancelled meanwhile.
    fn advance(
        &self,
        generation: u64,
        next: ConnectionState,
        update: impl FnOnce(&mut ActiveLink),
    ) -> Result<(), PeripheralError> {
        let mut inner = lock(&self.inner);
        if inner.generation != generation || !inner.state.is_in_flight() {
            return Err(PeripheralError::Cancelled);
        }
        let Some(link) = inner.link.as_mut() else {
            return Err(PeripheralError::Cancelled);
        };
        update(link);
        inner.set_state(self.extension_id, next);
        Ok(())
    }

    fn commit(&self, generation: u64) -> Result<(), PeripheralError> {
        let _events = lock(&self.events);
        {
            let mut inner = lock(&self.inner);
            if inner.generation != generation
                || inner.state != ConnectionState::Subscribing
                || inner.link.is_none()
            {
                return Err(PeripheralError::Cancelled);
            }
            inner.reported.clear();
            inner.set_state(self.extension_id, ConnectionState::Connected);
        }
        self.host.emit(HostEvent::Connected { extension_id: self.extension_id });
        Ok(())
    }

    /// Cleans up after a failed attempt and reports it once per category.
    ///
    /// Returns the device of the link this call took, if any; the caller owns
    /// its transport teardown.
    fn fail_attempt(
        &self,
        generation: u64,
        err: PeripheralError,
    ) -> (PeripheralError, Option<Arc<dyn DeviceLink>>) {
        let (link, err, report) = {
            let mut inner = lock(&self.inner);
            let current = inner.generation == generation;
            let abort_reason = if current { inner.abort_reason.take() } else { None };
            let err = match (err, abort_reason) {
                (PeripheralError::Cancelled, Some(reason)) => reason,
                (err, _) => err,
            };
            let category = err.category();
            let mut link = None;
            if current && inner.state.is_in_flight() {
                link = inner.link.take();
                if let Some(link) = &link {
                    link.invalidate();
                }
                let next = if category.is_silent() {
                    ConnectionState::Disconnected
                } else {
                    ConnectionState::Failed(category)
                };
                inner.set_state(self.extension_id, next);
            }
            let report = !category.is_silent() && inner.reported.insert(category);
            (link, err, report)
        };

        let released = link.map(ActiveLink::release);
        if err.category().is_silent() {
            info!("[{}] Connection attempt ended: {}", self.extension_id, err);
        } else {
            error!("[{}] Connection attempt failed: {}", self.extension_id, err);
        }
        if report {
            let category = err.category();
            self.host.emit(HostEvent::ConnectionError {
                extension_id: self.extension_id,
                category,
                message: category.user_message().to_string(),
            });
        }
        (err, released)
    }

    /// Unsolicited disconnect reported by the transport.
    fn connection_lost(&self, generation: u64) {
        let _events = lock(&self.events);
        let (link, was_connected) = {
            let mut inner = lock(&self.inner);
            if inner.generation != generation {
                return;
            }
            match inner.state {
                ConnectionState::Disconnected
                | ConnectionState::Disconnecting
                | ConnectionState::Failed(_) => return,
                _ => {}
            }
            let was_connected = inner.state == ConnectionState::Connected;
            if !was_connected {
                inner.abort_reason = Some(PeripheralError::Transport(
                    "link lost while connecting".to_string(),
                ));
            }
            inner.attempt.cancel();
            let link = inner.link.take();
            if let Some(link) = &link {
                link.invalidate();
            }
            inner.set_state(self.extension_id, ConnectionState::Disconnected);
            (link, was_connected)
        };

        warn!("[{}] Lost connection to peripheral", self.extension_id);
        if let Some(link) = link {
            drop(link.release());
        }
        if was_connected {
            self.host.emit(HostEvent::Disconnected {
                extension_id: self.extension_id,
                reason: DisconnectReason::Lost,
            });
        }
    }

    fn ingest(&self, generation: u64, source: Uuid, payload: Vec<u8>) {
        {
            let inner = lock(&self.inner);
            if inner.generation != generation || inner.link.is_none() {
                debug!("[{}] Ignoring frame from a stale link", self.extension_id);
                return;
            }
        }
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let frame = TelemetryFrame::new(source, payload, sequence);
        self.ingestor.on_frame(&frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::constants::*;
    use crate::core::bluetooth::mock::MockPeripheral;
    use crate::core::codec::{Direction, SensorKind};
    use crate::host::testing::RecordingHost;

    fn session(peripheral: &MockPeripheral, host: &Arc<RecordingHost>) -> PeripheralSession {
        PeripheralSession::new(
            "test",
            peripheral.transport(),
            host.clone(),
            Arc::new(TelemetryIngestor::default()),
        )
    }

    async fn wait_for_request(peripheral: &MockPeripheral) {
        while peripheral.requests() == 0 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn connects_and_resolves_every_required_handle() {
        let peripheral = MockPeripheral::robot();
        let host = Arc::new(RecordingHost::default());
        let session = session(&peripheral, &host);

        session.connect(&PeripheralDescriptor::drawing_robot()).await.unwrap();

        assert!(session.is_connected());
        let tx = session.handle(names::UART_TX).unwrap();
        assert!(tx.is_valid());
        assert_eq!(tx.uuid(), UUID_UART_TX_CHAR);
        assert_eq!(tx.service(), UUID_UART_SERVICE);
        assert!(session.service(UUID_UART_SERVICE).unwrap().is_valid());
        assert_eq!(peripheral.subscriber_count(), 1);
        assert!(peripheral.has_disconnect_listener());
        assert_eq!(host.count("peripheral-connected"), 1);
    }

    #[tokio::test]
    async fn second_connect_while_in_flight_is_rejected() {
        let peripheral = MockPeripheral::robot();
        peripheral.hold_requests();
        let host = Arc::new(RecordingHost::default());
        let session = session(&peripheral, &host);

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.connect(&PeripheralDescriptor::drawing_robot()).await })
        };
        wait_for_request(&peripheral).await;
        assert_eq!(session.state(), ConnectionState::Connecting);

        assert_eq!(
            session.connect(&PeripheralDescriptor::drawing_robot()).await,
            Err(PeripheralError::Busy)
        );

        peripheral.release_request();
        first.await.unwrap().unwrap();
        assert_eq!(peripheral.requests(), 1);
        assert_eq!(
            session.connect(&PeripheralDescriptor::drawing_robot()).await,
            Err(PeripheralError::AlreadyConnected)
        );
    }

    #[tokio::test]
    async fn missing_required_service_fails_without_partial_handles() {
        let peripheral = MockPeripheral::gameball();
        peripheral.remove_service(UUID_CAPACITOR_SERVICE);
        let host = Arc::new(RecordingHost::default());
        let session = session(&peripheral, &host);

        let result = session.connect(&PeripheralDescriptor::sensor_ball()).await;

        assert_eq!(result, Err(PeripheralError::ServiceNotFound(UUID_CAPACITOR_SERVICE)));
        assert_eq!(session.state(), ConnectionState::Failed(ErrorCategory::ProfileMismatch));
        assert!(session.handle(names::ACCEL1_CONFIG).is_none());
        assert_eq!(peripheral.subscriber_count(), 0);
        assert!(!peripheral.has_disconnect_listener());
        assert_eq!(peripheral.disconnects(), 1);
        assert_eq!(host.count("peripheral-error"), 1);
        assert_eq!(host.count("peripheral-connected"), 0);
    }

    #[tokio::test]
    async fn missing_optional_characteristic_is_tolerated() {
        let peripheral = MockPeripheral::gameball();
        peripheral.remove_characteristic(UUID_ACCEL1_DATA);
        let host = Arc::new(RecordingHost::default());
        let session = session(&peripheral, &host);

        session.connect(&PeripheralDescriptor::sensor_ball()).await.unwrap();

        assert!(session.handle(names::ACCEL1_DATA).is_none());
        assert!(session.handle(names::ACCEL2_DATA).is_some());
        // accelerometer 2 and the sample stream
        assert_eq!(peripheral.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn repeated_failures_are_reported_once() {
        let peripheral = MockPeripheral::robot();
        peripheral.fail_request(PeripheralError::DeviceNotFound(ROBOT_NAME_PREFIX.to_string()));
        let host = Arc::new(RecordingHost::default());
        let session = session(&peripheral, &host);

        for _ in 0..3 {
            let err = session.connect(&PeripheralDescriptor::drawing_robot()).await.unwrap_err();
            assert_eq!(err.category(), ErrorCategory::DeviceNotFound);
        }

        assert_eq!(peripheral.requests(), 3);
        assert_eq!(host.count("peripheral-error"), 1);
        assert_eq!(session.state(), ConnectionState::Failed(ErrorCategory::DeviceNotFound));
    }

    #[tokio::test]
    async fn cancelled_chooser_is_silent() {
        let peripheral = MockPeripheral::robot();
        peripheral.fail_request(PeripheralError::UserCancelled);
        let host = Arc::new(RecordingHost::default());
        let session = session(&peripheral, &host);

        let result = session.connect(&PeripheralDescriptor::drawing_robot()).await;

        assert_eq!(result, Err(PeripheralError::UserCancelled));
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(host.events().is_empty());
    }

    #[tokio::test]
    async fn unsolicited_disconnect_invalidates_everything_once() {
        let peripheral = MockPeripheral::robot();
        let host = Arc::new(RecordingHost::default());
        let session = session(&peripheral, &host);
        session.connect(&PeripheralDescriptor::drawing_robot()).await.unwrap();
        let tx = session.handle(names::UART_TX).unwrap();
        let token = session.connection_token().unwrap();

        peripheral.drop_link();
        peripheral.drop_link();

        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(!tx.is_valid());
        assert!(token.is_cancelled());
        assert_eq!(peripheral.subscriber_count(), 0);
        assert!(!peripheral.has_disconnect_listener());
        assert_eq!(
            session.send(&CommandMessage::Stop).await,
            Err(PeripheralError::NotConnected)
        );
        assert_eq!(
            host.events().last(),
            Some(&HostEvent::Disconnected { extension_id: "test", reason: DisconnectReason::Lost })
        );
        assert_eq!(host.count("peripheral-disconnected"), 1);
    }

    #[tokio::test]
    async fn reconnect_after_loss_gets_fresh_handles() {
        let peripheral = MockPeripheral::robot();
        let host = Arc::new(RecordingHost::default());
        let session = session(&peripheral, &host);
        session.connect(&PeripheralDescriptor::drawing_robot()).await.unwrap();
        let stale = session.handle(names::UART_TX).unwrap();
        peripheral.drop_link();

        session.connect(&PeripheralDescriptor::drawing_robot()).await.unwrap();

        assert!(!stale.is_valid());
        assert!(session.handle(names::UART_TX).unwrap().is_valid());
        assert_eq!(
            stale.write(b"(m,s)").await.unwrap_err().category(),
            ErrorCategory::Transport
        );
        assert_eq!(host.count("peripheral-connected"), 2);
    }

    #[tokio::test]
    async fn disconnect_during_connect_never_reaches_connected() {
        let peripheral = MockPeripheral::robot();
        peripheral.hold_requests();
        let host = Arc::new(RecordingHost::default());
        let session = session(&peripheral, &host);

        let attempt = {
            let session = session.clone();
            tokio::spawn(async move { session.connect(&PeripheralDescriptor::drawing_robot()).await })
        };
        wait_for_request(&peripheral).await;
        session.disconnect().await;
        peripheral.release_request();

        assert_eq!(attempt.await.unwrap(), Err(PeripheralError::Cancelled));
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(peripheral.subscriber_count(), 0);
        assert!(host.events().is_empty());
    }

    #[tokio::test]
    async fn failed_teardown_still_ends_disconnected() {
        let peripheral = MockPeripheral::robot();
        peripheral.fail_disconnect(true);
        let host = Arc::new(RecordingHost::default());
        let session = session(&peripheral, &host);
        session.connect(&PeripheralDescriptor::drawing_robot()).await.unwrap();

        session.disconnect().await;
        session.disconnect().await;

        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(peripheral.disconnects(), 1);
        assert_eq!(
            host.events().last(),
            Some(&HostEvent::Disconnected {
                extension_id: "test",
                reason: DisconnectReason::Requested
            })
        );
        assert_eq!(host.count("peripheral-disconnected"), 1);
    }

    #[tokio::test]
    async fn notifications_reach_the_ingestor_in_order() {
        let peripheral = MockPeripheral::gameball();
        let host = Arc::new(RecordingHost::default());
        let session = session(&peripheral, &host);
        session.connect(&PeripheralDescriptor::sensor_ball()).await.unwrap();

        assert!(peripheral.notify(UUID_SENSOR_STREAM_DATA, &[1, 0, 2, 0]));
        assert!(peripheral.notify(UUID_SENSOR_STREAM_DATA, &[3, 0]));

        let latest = session.ingestor().latest(SensorKind::SampleStream).unwrap();
        assert_eq!(latest.sequence, 2);

        session.disconnect().await;
        assert!(!peripheral.notify(UUID_SENSOR_STREAM_DATA, &[4, 0]));
    }

    #[tokio::test]
    async fn commands_are_routed_to_their_characteristic() {
        let peripheral = MockPeripheral::gameball();
        let host = Arc::new(RecordingHost::default());
        let session = session(&peripheral, &host);
        session.connect(&PeripheralDescriptor::sensor_ball()).await.unwrap();

        session
            .send(&CommandMessage::ThresholdConfig {
                accelerometer: Accelerometer::Second,
                threshold: ACCEL_THRESHOLD,
            })
            .await
            .unwrap();
        session
            .send(&CommandMessage::SensorConfig {
                target: ConfigTarget::SensorStream,
                value: SENSOR_STREAM_START,
            })
            .await
            .unwrap();

        assert_eq!(
            peripheral.writes(),
            vec![
                (UUID_ACCEL2_THRESHOLD, vec![135, 0]),
                (UUID_SENSOR_STREAM_CONFIG, vec![3]),
            ]
        );
        assert_eq!(
            session.send(&CommandMessage::Stop).await,
            Err(PeripheralError::UnknownAttribute(names::UART_TX.to_string()))
        );
    }

    #[tokio::test]
    async fn invalid_commands_never_reach_the_transport() {
        let peripheral = MockPeripheral::robot();
        let host = Arc::new(RecordingHost::default());
        let session = session(&peripheral, &host);
        session.connect(&PeripheralDescriptor::drawing_robot()).await.unwrap();

        let result = session
            .send(&CommandMessage::Drive { direction: Direction::Forward, steps: -5 })
            .await;

        assert_eq!(result.unwrap_err().category(), ErrorCategory::Protocol);
        assert!(peripheral.writes().is_empty());
    }

    #[tokio::test]
    async fn reads_respect_capabilities() {
        let peripheral = MockPeripheral::gameball();
        peripheral.push_read(UUID_CAPACITOR_VOLTAGE, Ok(vec![0, 8]));
        let host = Arc::new(RecordingHost::default());
        let session = session(&peripheral, &host);
        assert_eq!(
            session.read(names::CAPACITOR_VOLTAGE).await,
            Err(PeripheralError::NotConnected)
        );
        session.connect(&PeripheralDescriptor::sensor_ball()).await.unwrap();

        assert_eq!(session.read(names::CAPACITOR_VOLTAGE).await.unwrap(), vec![0, 8]);
        assert_eq!(
            session.read(names::SENSOR_STREAM_CONFIG).await,
            Err(PeripheralError::MissingCapability {
                name: names::SENSOR_STREAM_CONFIG,
                operation: "read"
            })
        );
    }

    #[tokio::test]
    async fn missing_adapter_fails_the_attempt_with_a_capability_message() {
        let peripheral = MockPeripheral::robot();
        peripheral.fail_request(PeripheralError::AdapterUnavailable);
        let host = Arc::new(RecordingHost::default());
        let session = session(&peripheral, &host);

        let result = session.connect(&PeripheralDescriptor::drawing_robot()).await;

        assert_eq!(result, Err(PeripheralError::AdapterUnavailable));
        assert_eq!(
            session.state(),
            ConnectionState::Failed(ErrorCategory::AdapterUnavailable)
        );
        assert_eq!(
            host.events(),
            vec![HostEvent::ConnectionError {
                extension_id: "test",
                category: ErrorCategory::AdapterUnavailable,
                message: ErrorCategory::AdapterUnavailable.user_message().to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn disconnect_while_linking_tears_down_once() {
        let peripheral = MockPeripheral::robot();
        peripheral.hold_connects();
        let host = Arc::new(RecordingHost::default());
        let session = session(&peripheral, &host);

        let attempt = {
            let session = session.clone();
            tokio::spawn(async move { session.connect(&PeripheralDescriptor::drawing_robot()).await })
        };
        while peripheral.connects() == 0 {
            tokio::task::yield_now().await;
        }
        session.disconnect().await;
        peripheral.release_request();

        assert_eq!(attempt.await.unwrap(), Err(PeripheralError::Cancelled));
        assert_eq!(peripheral.disconnects(), 1);
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(!peripheral.has_disconnect_listener());
        assert!(host.events().is_empty());
    }

    #[test]
    fn stale_attempt_leaves_the_current_abort_reason_alone() {
        let peripheral = MockPeripheral::robot();
        let host = Arc::new(RecordingHost::default());
        let session = session(&peripheral, &host);
        let lost = PeripheralError::Transport("link lost while connecting".to_string());
        {
            let mut inner = lock(&session.shared.inner);
            inner.generation = 2;
            inner.state = ConnectionState::Connecting;
            inner.abort_reason = Some(lost.clone());
        }

        let (err, released) = session.shared.fail_attempt(1, PeripheralError::Cancelled);

        assert_eq!(err, PeripheralError::Cancelled);
        assert!(released.is_none());
        let inner = lock(&session.shared.inner);
        assert_eq!(inner.state, ConnectionState::Connecting);
        assert_eq!(inner.abort_reason, Some(lost));
    }

    #[tokio::test]
    async fn failed_write_is_returned_and_keeps_the_link() {
        let peripheral = MockPeripheral::robot();
        let host = Arc::new(RecordingHost::default());
        let session = session(&peripheral, &host);
        session.connect(&PeripheralDescriptor::drawing_robot()).await.unwrap();
        peripheral.fail_writes(true);

        let result = session.send(&CommandMessage::Stop).await;

        assert!(matches!(result, Err(PeripheralError::Transport(_))));
        assert!(session.is_connected());
        assert_eq!(host.count("peripheral-error"), 0);

        peripheral.fail_writes(false);
        session.send(&CommandMessage::Stop).await.unwrap();
        assert_eq!(peripheral.uart_text(), vec!["(m,s)"]);
    }
}
