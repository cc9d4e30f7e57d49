//! In-memory central and peripheral for session tests
//!
//! Every write is recorded and handed to a responder that decides which
//! notifications the peripheral pushes back. Subscribing pushes one `[0x00]`
//! notification first, like the real lamp does.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use futures::stream::BoxStream;
use ion_proto::{Body, FirmwareVersion, OP_INIT, Packet};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::catalog::test_catalog;
use crate::config::{DfuConfig, LampConfig};
use crate::lamp::Lamp;
use crate::transport::{
    Advertisement, Central, CentralEvent, GattCharacteristic, GattService, Notification, Peripheral,
    WriteKind,
};
use crate::TransportError;

pub(crate) const LAMP_SERVICE: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);
pub(crate) const LAMP_CONTROL: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);
pub(crate) const LAMP_NOTIFY: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

pub(crate) const LAMP_NAME: &str = "ION-1";
pub(crate) const LAMP_ADDRESS: &str = "D9:9F:89:C9:A3:A9";

pub(crate) fn lamp_config() -> LampConfig {
    LampConfig::new(LAMP_SERVICE, LAMP_CONTROL, LAMP_NOTIFY)
}

/// Connect a lamp session over `central` and wait until it is ready
pub(crate) async fn ready_lamp(central: &MockCentral) -> Lamp<MockCentral> {
    let lamp = Lamp::new(central.clone(), LAMP_NAME, lamp_config(), test_catalog());
    lamp.connect().await.unwrap();
    lamp
}

type Responder = Box<dyn FnMut(Uuid, &[u8]) -> Vec<Notification> + Send>;

fn broadcast_stream<T: Clone + Send + 'static>(rx: broadcast::Receiver<T>) -> BoxStream<'static, T> {
    futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(item) => return Some((item, rx)),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

fn lamp_reply(packet: Packet) -> Vec<Notification> {
    vec![Notification { characteristic: LAMP_NOTIFY, value: packet.to_bytes() }]
}

/// Answers Init with `protocol_version` and everything else with Ack
pub(crate) fn lamp_responder(protocol_version: u16) -> Responder {
    Box::new(move |characteristic, data| {
        if characteristic != LAMP_CONTROL || data.len() < 2 {
            return Vec::new();
        }
        let body = if data[1] == OP_INIT {
            Body::FirmwareVersion(FirmwareVersion { protocol_version, firmware_version: 7, bonded: false })
        } else {
            Body::Ack
        };
        lamp_reply(Packet::new(data[0], body))
    })
}

#[derive(Clone)]
pub(crate) struct MockCentral {
    events: broadcast::Sender<CentralEvent<MockPeripheral>>,
    peripherals: Arc<Vec<MockPeripheral>>,
    scans: Arc<AtomicUsize>,
}

impl MockCentral {
    /// A central that can see one lamp
    pub(crate) fn new() -> Self {
        Self::build(MockPeripheral::lamp)
    }

    /// A central that can see one lamp sitting in the bootloader
    pub(crate) fn dfu(responder: Responder) -> Self {
        Self::build(|events| MockPeripheral::bootloader(events, responder))
    }

    fn build(
        peripheral: impl FnOnce(broadcast::Sender<CentralEvent<MockPeripheral>>) -> MockPeripheral,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        let peripheral = peripheral(events.clone());
        Self {
            events,
            peripherals: Arc::new(vec![peripheral]),
            scans: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn peripheral(&self) -> &MockPeripheral {
        &self.peripherals[0]
    }

    pub(crate) fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

impl Central for MockCentral {
    type Peripheral = MockPeripheral;

    async fn events(&self) -> Result<BoxStream<'static, CentralEvent<MockPeripheral>>, TransportError> {
        Ok(broadcast_stream(self.events.subscribe()))
    }

    async fn start_scan(&self, services: Vec<Uuid>) -> Result<(), TransportError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        for peripheral in self.peripherals.iter() {
            let advertisement = peripheral.advertisement();
            if services.is_empty() || services.iter().any(|s| advertisement.services.contains(s)) {
                let _ = self.events.send(CentralEvent::Discovered(advertisement));
            }
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[derive(Clone)]
pub(crate) struct MockPeripheral {
    inner: Arc<PeripheralState>,
}

struct PeripheralState {
    id: String,
    name: Option<String>,
    advertised: Vec<Uuid>,
    services: Vec<GattService>,
    central_events: broadcast::Sender<CentralEvent<MockPeripheral>>,
    notifications: broadcast::Sender<Notification>,
    writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
    descriptor_writes: Mutex<Vec<(Uuid, Uuid, Vec<u8>)>>,
    responder: Mutex<Responder>,
    subscribe_artifact: Mutex<Vec<u8>>,
    /// Writes that succeed before every further write fails; `None` is unlimited
    write_budget: Mutex<Option<usize>>,
    fail_disconnects: AtomicBool,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl MockPeripheral {
    fn new(
        central_events: broadcast::Sender<CentralEvent<MockPeripheral>>,
        advertised: Vec<Uuid>,
        services: Vec<GattService>,
        responder: Responder,
    ) -> Self {
        let (notifications, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(PeripheralState {
                id: "mock-1".to_string(),
                name: Some(LAMP_NAME.to_string()),
                advertised,
                services,
                central_events,
                notifications,
                writes: Mutex::new(Vec::new()),
                descriptor_writes: Mutex::new(Vec::new()),
                responder: Mutex::new(responder),
                subscribe_artifact: Mutex::new(vec![0x00]),
                write_budget: Mutex::new(None),
                fail_disconnects: AtomicBool::new(false),
                connects: AtomicUsize::new(0),
                disconnects: AtomicUsize::new(0),
            }),
        }
    }

    fn lamp(central_events: broadcast::Sender<CentralEvent<MockPeripheral>>) -> Self {
        let service = GattService {
            uuid: LAMP_SERVICE,
            characteristics: vec![
                GattCharacteristic { uuid: LAMP_CONTROL, descriptors: vec![] },
                GattCharacteristic { uuid: LAMP_NOTIFY, descriptors: vec![] },
            ],
        };
        Self::new(
            central_events,
            vec![LAMP_SERVICE],
            vec![service],
            lamp_responder(ion_proto::SUPPORTED_PROTOCOL_VERSION),
        )
    }

    fn bootloader(
        central_events: broadcast::Sender<CentralEvent<MockPeripheral>>,
        responder: Responder,
    ) -> Self {
        let dfu = DfuConfig::default();
        let service = GattService {
            uuid: dfu.service_uuid,
            characteristics: vec![
                GattCharacteristic { uuid: dfu.control_point_uuid, descriptors: vec![dfu.cccd_uuid] },
                GattCharacteristic { uuid: dfu.packet_uuid, descriptors: vec![] },
            ],
        };
        Self::new(central_events, vec![dfu.service_uuid], vec![service], responder)
    }

    fn advertisement(&self) -> Advertisement<MockPeripheral> {
        Advertisement {
            peripheral: self.clone(),
            address: LAMP_ADDRESS.to_string(),
            local_name: self.inner.name.clone(),
            services: self.inner.advertised.clone(),
            rssi: Some(-60),
        }
    }

    /// Replace how the lamp answers control writes
    pub(crate) fn reply_with(&self, mut reply: impl FnMut(u8, &[u8]) -> Option<Packet> + Send + 'static) {
        self.respond_with(Box::new(move |characteristic, data| {
            if characteristic != LAMP_CONTROL || data.is_empty() {
                return Vec::new();
            }
            reply(data[0], data).map(lamp_reply).unwrap_or_default()
        }));
    }

    pub(crate) fn respond_with(&self, responder: Responder) {
        *self.inner.responder.lock().unwrap() = responder;
    }

    /// Push a raw notification as if the peripheral sent it
    pub(crate) fn notify(&self, characteristic: Uuid, value: Vec<u8>) {
        let _ = self.inner.notifications.send(Notification { characteristic, value });
    }

    /// The link drops without anyone asking for it
    pub(crate) fn drop_link(&self) {
        let _ = self
            .inner
            .central_events
            .send(CentralEvent::Disconnected(self.inner.id.clone()));
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        *self.inner.write_budget.lock().unwrap() = fail.then_some(0);
    }

    /// Let `count` more writes through, then fail the rest
    pub(crate) fn fail_writes_after(&self, count: usize) {
        *self.inner.write_budget.lock().unwrap() = Some(count);
    }

    /// Disconnect requests error out and the link stays up
    pub(crate) fn fail_disconnects(&self, fail: bool) {
        self.inner.fail_disconnects.store(fail, Ordering::SeqCst);
    }

    /// What the peripheral pushes as soon as notifications are enabled
    pub(crate) fn set_subscribe_artifact(&self, value: Vec<u8>) {
        *self.inner.subscribe_artifact.lock().unwrap() = value;
    }

    /// Data of every write, in order
    pub(crate) fn writes(&self) -> Vec<Vec<u8>> {
        self.inner.writes.lock().unwrap().iter().map(|(_, data)| data.clone()).collect()
    }

    pub(crate) fn writes_to(&self, characteristic: Uuid) -> Vec<Vec<u8>> {
        self.inner
            .writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == characteristic)
            .map(|(_, data)| data.clone())
            .collect()
    }

    pub(crate) fn descriptor_writes(&self) -> Vec<(Uuid, Uuid, Vec<u8>)> {
        self.inner.descriptor_writes.lock().unwrap().clone()
    }

    pub(crate) fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn disconnects(&self) -> usize {
        self.inner.disconnects.load(Ordering::SeqCst)
    }

    fn respond(&self, characteristic: Uuid, data: &[u8]) {
        let replies = {
            let mut responder = self.inner.responder.lock().unwrap();
            (*responder)(characteristic, data)
        };
        for reply in replies {
            let _ = self.inner.notifications.send(reply);
        }
    }
}

impl Peripheral for MockPeripheral {
    fn id(&self) -> String {
        self.inner.id.clone()
    }

    async fn connect(&self) -> Result<(), TransportError> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.inner.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_disconnects.load(Ordering::SeqCst) {
            return Err(TransportError::new("disconnect failed"));
        }
        self.drop_link();
        Ok(())
    }

    async fn discover_services(&self) -> Result<Vec<GattService>, TransportError> {
        Ok(self.inner.services.clone())
    }

    async fn write(&self, characteristic: Uuid, data: &[u8], _kind: WriteKind) -> Result<(), TransportError> {
        {
            let mut budget = self.inner.write_budget.lock().unwrap();
            match *budget {
                Some(0) => return Err(TransportError::new("write failed")),
                Some(ref mut left) => *left -= 1,
                None => {}
            }
        }
        self.inner.writes.lock().unwrap().push((characteristic, data.to_vec()));
        self.respond(characteristic, data);
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<(), TransportError> {
        let artifact = self.inner.subscribe_artifact.lock().unwrap().clone();
        self.notify(characteristic, artifact);
        Ok(())
    }

    async fn notifications(&self) -> Result<BoxStream<'static, Notification>, TransportError> {
        Ok(broadcast_stream(self.inner.notifications.subscribe()))
    }

    async fn write_descriptor(
        &self,
        characteristic: Uuid,
        descriptor: Uuid,
        data: &[u8],
    ) -> Result<(), TransportError> {
        self.inner
            .descriptor_writes
            .lock()
            .unwrap()
            .push((characteristic, descriptor, data.to_vec()));
        Ok(())
    }
}
