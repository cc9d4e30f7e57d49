//! Lamp session - discovery, connection, handshake, reply routing and reconnect
//!
//! ```text
//! Disconnected -> Scanning -> Connecting -> DiscoveringServices
//!     -> DiscoveringCharacteristics -> EnablingNotify -> Initializing -> Ready
//! ```
//!
//! A transport disconnect from any connected state resets the session to
//! `Disconnected`. With auto-reconnect on, one reconnect is scheduled after
//! `LampConfig::reconnect_delay` and re-enters at `Connecting` without a scan.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::StreamExt;
use futures::stream::BoxStream;
use ion_proto::{Body, Command, DeviceType, Packet};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::LampConfig;
use crate::correlator::{Correlator, Routed};
use crate::raw_buffer::RawLedBuffer;
use crate::transport::{
    Advertisement, Central, CentralEvent, Notification, Peripheral, WriteKind, normalize_address,
};
use crate::LampError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Scanning,
    Connecting,
    DiscoveringServices,
    DiscoveringCharacteristics,
    EnablingNotify,
    Initializing,
    Ready,
    /// Reconnect timer fired, connecting again
    Reconnecting,
}

impl SessionState {
    /// A transport connection is up
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            Self::DiscoveringServices
                | Self::DiscoveringCharacteristics
                | Self::EnablingNotify
                | Self::Initializing
                | Self::Ready
        )
    }
}

/// Events a lamp session emits, see `Lamp::subscribe`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LampEvent {
    Discovered,
    Connected,
    Disconnected,
    Reconnecting,
    Error(LampError),
    /// The lamp changed mood on its own (tap, shuffle)
    MoodChanged(Mood),
    Ready,
}

/// A mood id together with its catalog name, if the catalog knows it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mood {
    pub id: u8,
    pub name: Option<String>,
}

type Completion = oneshot::Sender<Result<Packet, LampError>>;

struct Session<P> {
    identifier: String,
    identified_via_name: bool,
    name: Option<String>,
    peripheral: Option<P>,
    discovery_complete: bool,
    state: SessionState,
    auto_reconnect: bool,
    initial_notify_acknowledged: bool,
    requests: Correlator<Completion>,
    raw: RawLedBuffer,
    reconnect_timer: Option<JoinHandle<()>>,
    weather_timer: Option<JoinHandle<()>>,
    /// Restarts weather updates each time the session becomes ready
    weather_watch: Option<JoinHandle<()>>,
    notify_task: Option<JoinHandle<()>>,
    disconnect_watch: Option<JoinHandle<()>>,
}

impl<P> Session<P> {
    /// Back to what a fresh session looks like, except for the peripheral and
    /// the raw buffer, which survive for the reconnect
    fn reset(&mut self) {
        self.name = None;
        self.state = SessionState::Disconnected;
        self.initial_notify_acknowledged = false;
        self.requests.reset();
        if let Some(task) = self.notify_task.take() {
            task.abort();
        }
        if let Some(timer) = self.weather_timer.take() {
            timer.abort();
        }
    }
}

pub(crate) struct Inner<C: Central> {
    central: C,
    pub(crate) config: LampConfig,
    pub(crate) catalog: Catalog,
    events: broadcast::Sender<LampEvent>,
    session: Mutex<Session<C::Peripheral>>,
    /// Held across each control write so only one is in flight
    write_lock: tokio::sync::Mutex<()>,
    /// Held for a whole raw buffer flush
    pub(crate) flush_lock: tokio::sync::Mutex<()>,
}

/// Handle to one lamp. Cheap to clone; clones share the session.
pub struct Lamp<C: Central> {
    pub(crate) inner: Arc<Inner<C>>,
}

impl<C: Central> Clone for Lamp<C> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<C: Central> Lamp<C> {
    /// `identifier` is the lamp's advertised name or its address
    pub fn new(central: C, identifier: impl Into<String>, config: LampConfig, catalog: Catalog) -> Self {
        let (events, _) = broadcast::channel(64);
        let session = Session {
            identifier: identifier.into(),
            identified_via_name: false,
            name: None,
            peripheral: None,
            discovery_complete: false,
            state: SessionState::Disconnected,
            auto_reconnect: false,
            initial_notify_acknowledged: false,
            requests: Correlator::new(),
            raw: RawLedBuffer::new(),
            reconnect_timer: None,
            weather_timer: None,
            weather_watch: None,
            notify_task: None,
            disconnect_watch: None,
        };

        Self {
            inner: Arc::new(Inner {
                central,
                config,
                catalog,
                events,
                session: Mutex::new(session),
                write_lock: tokio::sync::Mutex::new(()),
                flush_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    fn from_weak(weak: &Weak<Inner<C>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn session(&self) -> MutexGuard<'_, Session<C::Peripheral>> {
        self.inner.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn emit(&self, event: LampEvent) {
        // no receivers is fine
        let _ = self.inner.events.send(event);
    }

    fn set_state(&self, state: SessionState) {
        debug!(?state, "lamp session state");
        self.session().state = state;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LampEvent> {
        self.inner.events.subscribe()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    pub fn config(&self) -> &LampConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        self.session().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Ready to accept commands
    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Name the lamp advertised, updated when it is renamed
    pub fn name(&self) -> Option<String> {
        self.session().name.clone()
    }

    pub fn identifier(&self) -> String {
        self.session().identifier.clone()
    }

    pub fn auto_reconnect(&self) -> bool {
        self.session().auto_reconnect
    }

    pub fn set_auto_reconnect(&self, reconnect: bool) {
        self.session().auto_reconnect = reconnect;
    }

    /// Number of requests waiting for a reply
    pub fn pending_requests(&self) -> usize {
        self.session().requests.pending()
    }

    /// Find the lamp (unless it was found before) and bring the session up to
    /// `Ready`. Errors are also emitted as `LampEvent::Error`.
    pub async fn connect(&self) -> Result<(), LampError> {
        let known = {
            let session = self.session();
            session.peripheral.clone().filter(|_| session.discovery_complete)
        };

        let peripheral = match known {
            Some(peripheral) => peripheral,
            None => match self.scan().await {
                Ok(peripheral) => peripheral,
                Err(e) => {
                    self.set_state(SessionState::Disconnected);
                    self.emit(LampEvent::Error(e.clone()));
                    return Err(e);
                }
            },
        };

        self.establish(peripheral).await
    }

    /// Disconnect on purpose; this also turns auto-reconnect off. Session
    /// cleanup happens when the transport reports the disconnect.
    pub async fn disconnect(&self) -> Result<(), LampError> {
        let peripheral = {
            let mut session = self.session();
            if let Some(timer) = session.reconnect_timer.take() {
                timer.abort();
            }
            if !session.state.is_connected() {
                return Ok(());
            }
            session.auto_reconnect = false;
            session.peripheral.clone()
        };

        if let Some(peripheral) = peripheral {
            info!("disconnecting from lamp");
            peripheral.disconnect().await?;
        }
        Ok(())
    }

    fn matches(&self, advertisement: &Advertisement<C::Peripheral>) -> Option<bool> {
        let identifier = self.identifier();
        if advertisement.local_name.as_deref() == Some(identifier.as_str()) {
            return Some(true);
        }
        if !advertisement.address.is_empty()
            && normalize_address(&advertisement.address) == normalize_address(&identifier)
        {
            return Some(false);
        }
        None
    }

    async fn scan(&self) -> Result<C::Peripheral, LampError> {
        self.set_state(SessionState::Scanning);
        info!(identifier = %self.identifier(), "scanning for lamp");

        let mut events = self.inner.central.events().await?;
        self.inner.central.start_scan(Vec::new()).await?;

        while let Some(event) = events.next().await {
            let CentralEvent::Discovered(advertisement) = event else {
                continue;
            };
            let Some(via_name) = self.matches(&advertisement) else {
                continue;
            };

            self.inner.central.stop_scan().await?;
            info!(address = %advertisement.address, name = ?advertisement.local_name, "found lamp");

            let peripheral = advertisement.peripheral;
            {
                let mut session = self.session();
                session.name = advertisement.local_name;
                session.identified_via_name = via_name;
                session.peripheral = Some(peripheral.clone());
            }
            self.emit(LampEvent::Discovered);
            self.watch_disconnects(&peripheral).await?;
            return Ok(peripheral);
        }

        Err(LampError::LampNotFound(self.identifier()))
    }

    async fn watch_disconnects(&self, peripheral: &C::Peripheral) -> Result<(), LampError> {
        let mut events = self.inner.central.events().await?;
        let id = peripheral.id();
        let weak = Arc::downgrade(&self.inner);

        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let CentralEvent::Disconnected(gone) = event else {
                    continue;
                };
                if gone != id {
                    continue;
                }
                let Some(lamp) = Lamp::from_weak(&weak) else {
                    return;
                };
                lamp.handle_disconnect();
            }
        });

        if let Some(old) = self.session().disconnect_watch.replace(task) {
            old.abort();
        }
        Ok(())
    }

    async fn establish(&self, peripheral: C::Peripheral) -> Result<(), LampError> {
        let result = self.try_establish(&peripheral).await;
        if let Err(e) = &result {
            warn!("lamp setup failed: {e}");
            {
                let mut session = self.session();
                if matches!(session.state, SessionState::Connecting | SessionState::Reconnecting) {
                    session.state = SessionState::Disconnected;
                }
            }
            self.emit(LampEvent::Error(e.clone()));
        }
        result
    }

    async fn try_establish(&self, peripheral: &C::Peripheral) -> Result<(), LampError> {
        let config = &self.inner.config;

        self.set_state(SessionState::Connecting);
        peripheral.connect().await?;
        self.set_state(SessionState::DiscoveringServices);
        info!("connected to lamp");
        self.emit(LampEvent::Connected);

        let services = peripheral.discover_services().await?;
        let service = services
            .iter()
            .find(|s| s.uuid == config.service_uuid)
            .ok_or(LampError::ServiceNotFound(config.service_uuid))?;

        self.set_state(SessionState::DiscoveringCharacteristics);
        for uuid in [config.control_uuid, config.notify_uuid] {
            if !service.characteristics.iter().any(|c| c.uuid == uuid) {
                return Err(LampError::CharacteristicNotFound(uuid));
            }
        }

        self.set_state(SessionState::EnablingNotify);
        let notifications = peripheral.notifications().await?;
        self.pump_notifications(notifications);
        peripheral.subscribe(config.notify_uuid).await?;

        self.set_state(SessionState::Initializing);
        let reply = self.request(Command::Init(DeviceType::Host), true).await?;
        let Body::FirmwareVersion(version) = reply.body else {
            return Err(LampError::UnexpectedReply(reply.op_code));
        };

        if version.protocol_version != config.protocol_version {
            self.set_auto_reconnect(false);
            if let Err(e) = self.disconnect().await {
                warn!("disconnect after protocol mismatch failed: {e}");
            }
            return Err(LampError::ProtocolMismatch {
                found: version.protocol_version,
                supported: config.protocol_version,
            });
        }

        {
            let mut session = self.session();
            session.discovery_complete = true;
            session.state = SessionState::Ready;
        }
        info!(firmware = version.firmware_version, bonded = version.bonded, "lamp ready");
        self.emit(LampEvent::Ready);
        Ok(())
    }

    fn pump_notifications(&self, mut notifications: BoxStream<'static, Notification>) {
        let notify_uuid = self.inner.config.notify_uuid;
        let weak = Arc::downgrade(&self.inner);

        let task = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.characteristic != notify_uuid {
                    continue;
                }
                let Some(lamp) = Lamp::from_weak(&weak) else {
                    return;
                };
                lamp.handle_notification(&notification.value);
            }
        });

        if let Some(old) = self.session().notify_task.replace(task) {
            old.abort();
        }
    }

    fn handle_notification(&self, data: &[u8]) {
        let mut session = self.session();

        // the lamp sends one notification as soon as notify is enabled
        if !session.initial_notify_acknowledged {
            session.initial_notify_acknowledged = true;
            debug!("discarding initial notification");
            return;
        }

        debug!(packet = %data_encoding::HEXLOWER.encode(data), "lamp notification");
        let packet = match Packet::decode(data) {
            Ok(packet) => packet,
            Err(e) => {
                drop(session);
                self.emit(LampEvent::Error(e.into()));
                return;
            }
        };

        match session.requests.route(packet) {
            Routed::Reply(completion, packet) => {
                if let Body::DeviceName(name) = &packet.body {
                    session.name = Some(name.clone());
                    if session.identified_via_name {
                        session.identifier = name.clone();
                    }
                }
                drop(session);

                let result = match packet.body {
                    Body::Nak(reason) => Err(LampError::Nak(reason)),
                    Body::Unknown(_) => Err(LampError::UnknownOpCode(packet.op_code)),
                    _ => Ok(packet),
                };

                if let Err(e @ LampError::UnknownOpCode(_)) = &result {
                    self.emit(LampEvent::Error(e.clone()));
                }
                // the caller may have stopped waiting
                let _ = completion.send(result);
            }
            Routed::Event(packet) => {
                drop(session);
                self.handle_event(packet);
            }
            Routed::Unmatched(packet) => {
                drop(session);
                self.emit(LampEvent::Error(LampError::UnknownRequestId(packet.request_id)));
            }
        }
    }

    fn handle_event(&self, packet: Packet) {
        match packet.body {
            Body::CurrentMood(id) => {
                let name = self.inner.catalog.mood_name(id);
                info!(mood = id, ?name, "mood changed");
                self.emit(LampEvent::MoodChanged(Mood { id, name }));
            }
            other => debug!(op_code = packet.op_code, body = ?other, "ignoring lamp event"),
        }
    }

    fn handle_disconnect(&self) {
        let reconnect = {
            let mut session = self.session();
            if session.state == SessionState::Disconnected {
                return;
            }
            session.reset();

            let reconnect = session.auto_reconnect && session.reconnect_timer.is_none();
            if reconnect {
                session.reconnect_timer = Some(self.schedule_reconnect());
            }
            reconnect
        };

        info!(reconnect, "lamp disconnected");
        self.emit(LampEvent::Disconnected);
    }

    fn schedule_reconnect(&self) -> JoinHandle<()> {
        let delay = self.inner.config.reconnect_delay();
        let weak = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(lamp) = Lamp::from_weak(&weak) else {
                return;
            };
            lamp.emit(LampEvent::Reconnecting);
            lamp.reconnect().await;
        })
    }

    async fn reconnect(&self) {
        let peripheral = {
            let mut session = self.session();
            session.reconnect_timer = None;
            if session.state != SessionState::Disconnected {
                return;
            }
            session.state = SessionState::Reconnecting;
            session.peripheral.clone()
        };

        let Some(peripheral) = peripheral else {
            self.set_state(SessionState::Disconnected);
            return;
        };

        info!("reconnecting to lamp");
        // failures were already emitted; the next disconnect schedules another try
        let _ = self.establish(peripheral).await;
    }

    /// Send one command and wait for its reply
    pub(crate) async fn send(&self, command: Command) -> Result<Packet, LampError> {
        self.request(command, false).await
    }

    async fn request(&self, command: Command, handshake: bool) -> Result<Packet, LampError> {
        let mut replies = self.request_all(std::slice::from_ref(&command), handshake).await?;
        replies.pop().ok_or(LampError::Disconnected)
    }

    /// Assign consecutive request ids to `commands`, write them in order and
    /// wait for all replies. Nothing is written unless the session is ready
    /// (or initializing, for the handshake).
    pub(crate) async fn request_all(
        &self,
        commands: &[Command],
        handshake: bool,
    ) -> Result<Vec<Packet>, LampError> {
        let (peripheral, packets, receivers) = {
            let mut session = self.session();
            let allowed = match session.state {
                SessionState::Ready => true,
                SessionState::Initializing => handshake,
                _ => false,
            };
            if !allowed {
                return Err(LampError::NotReady);
            }
            let peripheral = session.peripheral.clone().ok_or(LampError::NotReady)?;

            let mut packets = Vec::with_capacity(commands.len());
            let mut receivers = Vec::with_capacity(commands.len());
            for command in commands {
                let (tx, rx) = oneshot::channel();
                let id = session.requests.assign(tx);
                packets.push((id, command.encode(id)));
                receivers.push(rx);
            }
            (peripheral, packets, receivers)
        };

        {
            let _write = self.inner.write_lock.lock().await;
            for (id, bytes) in &packets {
                debug!(request_id = id, packet = %data_encoding::HEXLOWER.encode(bytes), "sending");
                let written = peripheral
                    .write(self.inner.config.control_uuid, bytes, WriteKind::WithResponse)
                    .await;

                if let Err(e) = written {
                    let e = LampError::from(e);
                    // the whole batch fails, replies to the written part are dropped
                    {
                        let mut session = self.session();
                        for (id, _) in &packets {
                            session.requests.take(*id);
                        }
                    }
                    self.emit(LampEvent::Error(e.clone()));
                    return Err(e);
                }
            }
        }

        let mut replies = Vec::with_capacity(receivers.len());
        for rx in receivers {
            // a dropped sender means the session was reset under us
            replies.push(rx.await.map_err(|_| LampError::Disconnected)??);
        }
        Ok(replies)
    }

    pub(crate) fn set_weather_timer(&self, timer: JoinHandle<()>) {
        if let Some(old) = self.session().weather_timer.replace(timer) {
            old.abort();
        }
    }

    pub(crate) fn set_weather_watch(&self, watch: JoinHandle<()>) {
        if let Some(old) = self.session().weather_watch.replace(watch) {
            old.abort();
        }
    }

    pub(crate) fn with_raw<R>(&self, f: impl FnOnce(&mut RawLedBuffer) -> R) -> R {
        f(&mut self.session().raw)
    }
}
