//! In-memory transport for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::core::bluetooth::constants::*;
use crate::core::bluetooth::transport::{
    DeviceLink, DisconnectCallback, GattCharacteristic, GattServer, GattService, NotifyCallback,
    Transport,
};
use crate::core::bluetooth::types::Capabilities;
use crate::error::PeripheralError;

#[derive(Default)]
struct MockState {
    name: String,
    services: HashMap<Uuid, Vec<(Uuid, Capabilities)>>,
    hold_requests: bool,
    hold_connects: bool,
    request_error: Option<PeripheralError>,
    fail_writes: bool,
    fail_disconnect: bool,
    requests: usize,
    connects: usize,
    disconnects: usize,
    writes: Vec<(Uuid, Vec<u8>)>,
    scripted_reads: HashMap<Uuid, VecDeque<Result<Vec<u8>, PeripheralError>>>,
    reads: HashMap<Uuid, usize>,
    subscribers: HashMap<Uuid, NotifyCallback>,
    disconnect_listener: Option<DisconnectCallback>,
}

/// A scripted peripheral plus the transport that finds it.
#[derive(Clone, Default)]
pub(crate) struct MockPeripheral {
    state: Arc<Mutex<MockState>>,
    gate: Arc<Notify>,
}

impl MockPeripheral {
    fn with_services(name: &str, services: Vec<(Uuid, Vec<(Uuid, Capabilities)>)>) -> Self {
        let peripheral = Self::default();
        {
            let mut state = peripheral.lock();
            state.name = name.to_string();
            state.services = services.into_iter().collect();
        }
        peripheral
    }

    pub(crate) fn robot() -> Self {
        Self::with_services(
            "Bluefruit52 test",
            vec![(
                UUID_UART_SERVICE,
                vec![
                    (UUID_UART_TX_CHAR, Capabilities::WRITE),
                    (UUID_UART_RX_CHAR, Capabilities::NOTIFY),
                ],
            )],
        )
    }

    pub(crate) fn gameball() -> Self {
        Self::with_services(
            "Gameball test",
            vec![
                (UUID_GAMEBALL_SERVICE, vec![(UUID_DEVICE_REFRESH_GATT, Capabilities::WRITE)]),
                (
                    UUID_ACCEL1_SERVICE,
                    vec![
                        (UUID_ACCEL1_CONFIG, Capabilities::READ_WRITE),
                        (UUID_ACCEL1_THRESHOLD, Capabilities::READ_WRITE),
                        (UUID_ACCEL1_DATA, Capabilities::READ_NOTIFY),
                    ],
                ),
                (
                    UUID_ACCEL2_SERVICE,
                    vec![
                        (UUID_ACCEL2_CONFIG, Capabilities::READ_WRITE),
                        (UUID_ACCEL2_THRESHOLD, Capabilities::READ_WRITE),
                        (UUID_ACCEL2_DATA, Capabilities::READ_NOTIFY),
                    ],
                ),
                (
                    UUID_SENSOR_STREAM_SERVICE,
                    vec![
                        (UUID_SENSOR_STREAM_CONFIG, Capabilities::WRITE),
                        (UUID_SENSOR_STREAM_DATA, Capabilities::NOTIFY),
                    ],
                ),
                (
                    UUID_CAPACITOR_SERVICE,
                    vec![
                        (UUID_CAPACITOR_VOLTAGE, Capabilities::READ),
                        (UUID_CAPACITOR_CHARGING, Capabilities::READ),
                    ],
                ),
            ],
        )
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn transport(&self) -> Arc<dyn Transport> {
        Arc::new(MockTransport { peripheral: self.clone() })
    }

    pub(crate) fn remove_service(&self, service: Uuid) {
        self.lock().services.remove(&service);
    }

    pub(crate) fn remove_characteristic(&self, characteristic: Uuid) {
        for list in self.lock().services.values_mut() {
            list.retain(|(uuid, _)| *uuid != characteristic);
        }
    }

    /// Keeps `request_device` pending until `release_request`.
    pub(crate) fn hold_requests(&self) {
        self.lock().hold_requests = true;
    }

    pub(crate) fn release_request(&self) {
        self.gate.notify_one();
    }

    /// Keeps `DeviceLink::connect` pending until `release_request`.
    pub(crate) fn hold_connects(&self) {
        self.lock().hold_connects = true;
    }

    pub(crate) fn fail_request(&self, err: PeripheralError) {
        self.lock().request_error = Some(err);
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub(crate) fn fail_disconnect(&self, fail: bool) {
        self.lock().fail_disconnect = fail;
    }

    pub(crate) fn push_read(&self, characteristic: Uuid, result: Result<Vec<u8>, PeripheralError>) {
        self.lock()
            .scripted_reads
            .entry(characteristic)
            .or_default()
            .push_back(result);
    }

    pub(crate) fn reads(&self, characteristic: Uuid) -> usize {
        self.lock().reads.get(&characteristic).copied().unwrap_or(0)
    }

    pub(crate) fn requests(&self) -> usize {
        self.lock().requests
    }

    pub(crate) fn connects(&self) -> usize {
        self.lock().connects
    }

    pub(crate) fn disconnects(&self) -> usize {
        self.lock().disconnects
    }

    pub(crate) fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.lock().writes.clone()
    }

    /// Text written to the UART, one entry per write.
    pub(crate) fn uart_text(&self) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter(|(uuid, _)| *uuid == UUID_UART_TX_CHAR)
            .map(|(_, bytes)| String::from_utf8_lossy(&bytes).into_owned())
            .collect()
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub(crate) fn has_disconnect_listener(&self) -> bool {
        self.lock().disconnect_listener.is_some()
    }

    /// Pushes a notification; returns false when nobody listens.
    pub(crate) fn notify(&self, characteristic: Uuid, payload: &[u8]) -> bool {
        let callback = self.lock().subscribers.get(&characteristic).cloned();
        match callback {
            Some(callback) => {
                callback(payload.to_vec());
                true
            }
            None => false,
        }
    }

    /// Simulates the peripheral dropping the link.
    pub(crate) fn drop_link(&self) {
        let callback = self.lock().disconnect_listener.clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

struct MockTransport {
    peripheral: MockPeripheral,
}

#[async_trait]
impl Transport for MockTransport {
    async fn request_device(
        &self,
        name_prefix: &str,
        _required_services: &[Uuid],
    ) -> Result<Arc<dyn DeviceLink>, PeripheralError> {
        let hold = {
            let mut state = self.peripheral.lock();
            state.requests += 1;
            state.hold_requests
        };
        if hold {
            self.peripheral.gate.notified().await;
        }
        let state = self.peripheral.lock();
        if let Some(err) = state.request_error.clone() {
            return Err(err);
        }
        if !state.name.starts_with(name_prefix) {
            return Err(PeripheralError::DeviceNotFound(name_prefix.to_string()));
        }
        Ok(Arc::new(MockDevice { peripheral: self.peripheral.clone() }))
    }
}

struct MockDevice {
    peripheral: MockPeripheral,
}

#[async_trait]
impl DeviceLink for MockDevice {
    fn id(&self) -> String {
        "mock-device".to_string()
    }

    fn name(&self) -> Option<String> {
        Some(self.peripheral.lock().name.clone())
    }

    async fn connect(&self) -> Result<Arc<dyn GattServer>, PeripheralError> {
        let hold = {
            let mut state = self.peripheral.lock();
            state.connects += 1;
            state.hold_connects
        };
        if hold {
            self.peripheral.gate.notified().await;
        }
        Ok(Arc::new(MockServer { peripheral: self.peripheral.clone() }))
    }

    async fn disconnect(&self) -> Result<(), PeripheralError> {
        let mut state = self.peripheral.lock();
        state.disconnects += 1;
        if state.fail_disconnect {
            return Err(PeripheralError::Transport("radio refused to disconnect".to_string()));
        }
        Ok(())
    }

    fn on_disconnected(&self, callback: DisconnectCallback) {
        self.peripheral.lock().disconnect_listener = Some(callback);
    }

    fn remove_disconnect_listener(&self) {
        self.peripheral.lock().disconnect_listener = None;
    }
}

struct MockServer {
    peripheral: MockPeripheral,
}

#[async_trait]
impl GattServer for MockServer {
    async fn get_service(&self, id: Uuid) -> Result<Arc<dyn GattService>, PeripheralError> {
        if self.peripheral.lock().services.contains_key(&id) {
            Ok(Arc::new(MockService { peripheral: self.peripheral.clone(), uuid: id }))
        } else {
            Err(PeripheralError::ServiceNotFound(id))
        }
    }
}

struct MockService {
    peripheral: MockPeripheral,
    uuid: Uuid,
}

#[async_trait]
impl GattService for MockService {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    async fn get_characteristic(
        &self,
        id: Uuid,
    ) -> Result<Arc<dyn GattCharacteristic>, PeripheralError> {
        let state = self.peripheral.lock();
        state
            .services
            .get(&self.uuid)
            .and_then(|list| list.iter().find(|(uuid, _)| *uuid == id))
            .map(|(uuid, capabilities)| {
                Arc::new(MockCharacteristic {
                    peripheral: self.peripheral.clone(),
                    uuid: *uuid,
                    capabilities: *capabilities,
                }) as Arc<dyn GattCharacteristic>
            })
            .ok_or(PeripheralError::CharacteristicNotFound(id))
    }
}

struct MockCharacteristic {
    peripheral: MockPeripheral,
    uuid: Uuid,
    capabilities: Capabilities,
}

#[async_trait]
impl GattCharacteristic for MockCharacteristic {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn write(&self, data: &[u8]) -> Result<(), PeripheralError> {
        let mut state = self.peripheral.lock();
        if state.fail_writes {
            return Err(PeripheralError::Transport("write rejected".to_string()));
        }
        state.writes.push((self.uuid, data.to_vec()));
        Ok(())
    }

    async fn read(&self) -> Result<Vec<u8>, PeripheralError> {
        let mut state = self.peripheral.lock();
        *state.reads.entry(self.uuid).or_default() += 1;
        state
            .scripted_reads
            .get_mut(&self.uuid)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(PeripheralError::Transport("nothing to read".to_string())))
    }

    async fn subscribe(&self, callback: NotifyCallback) -> Result<(), PeripheralError> {
        self.peripheral.lock().subscribers.insert(self.uuid, callback);
        Ok(())
    }

    fn unsubscribe(&self) {
        self.peripheral.lock().subscribers.remove(&self.uuid);
    }
}
