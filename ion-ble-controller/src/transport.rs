//! Transport seam between the lamp/DFU sessions and a BLE central stack
//!
//! `ble` implements these traits with btleplug; tests use an in-memory fake.
//! Characteristics are addressed by UUID, the implementation resolves them
//! against what `discover_services` found.

use std::future::Future;

use futures::stream::BoxStream;
use uuid::Uuid;

use crate::TransportError;

/// Something heard while scanning
#[derive(Debug, Clone)]
pub struct Advertisement<P> {
    pub peripheral: P,
    /// Hardware address, `AA:BB:CC:DD:EE:FF` style where the platform exposes one
    pub address: String,
    pub local_name: Option<String>,
    pub services: Vec<Uuid>,
    pub rssi: Option<i16>,
}

#[derive(Debug, Clone)]
pub enum CentralEvent<P> {
    Discovered(Advertisement<P>),
    /// Carries `Peripheral::id` of the peripheral that went away
    Disconnected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub descriptors: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<GattCharacteristic>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    WithResponse,
    WithoutResponse,
}

/// Value pushed by the peripheral on a subscribed characteristic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub characteristic: Uuid,
    pub value: Vec<u8>,
}

pub trait Central: Clone + Send + Sync + 'static {
    type Peripheral: Peripheral;

    /// Stream of discovery and disconnect events. Each call returns an
    /// independent stream.
    fn events(
        &self,
    ) -> impl Future<Output = Result<BoxStream<'static, CentralEvent<Self::Peripheral>>, TransportError>>
    + Send;

    /// Start scanning, limited to peripherals advertising one of `services`
    /// (all peripherals if empty)
    fn start_scan(&self, services: Vec<Uuid>) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn stop_scan(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

pub trait Peripheral: Clone + Send + Sync + 'static {
    /// Stable identifier, matched against `CentralEvent::Disconnected`
    fn id(&self) -> String;

    fn connect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn discover_services(&self) -> impl Future<Output = Result<Vec<GattService>, TransportError>> + Send;

    fn write(
        &self,
        characteristic: Uuid,
        data: &[u8],
        kind: WriteKind,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn subscribe(&self, characteristic: Uuid) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Notifications from every subscribed characteristic of this peripheral
    fn notifications(
        &self,
    ) -> impl Future<Output = Result<BoxStream<'static, Notification>, TransportError>> + Send;

    fn write_descriptor(
        &self,
        characteristic: Uuid,
        descriptor: Uuid,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Lowercased address without separators, so `D9:9F:89:C9:A3:A9`,
/// `d9-9f-89-c9-a3-a9` and `d99f89c9a3a9` compare equal
pub fn normalize_address(address: &str) -> String {
    address
        .chars()
        .filter(|c| *c != ':' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}
