//! btleplug implementation of the transport traits
//!
//! Also provides a one-shot scan used by `ion-ble scan`.

use btleplug::api::{
    Central as _, CentralEvent as BtleEvent, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral as PlatformPeripheral, PeripheralId};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::time::Duration;
use uuid::Uuid;

use crate::transport::{
    Advertisement, Central, CentralEvent, GattCharacteristic, GattService, Notification, Peripheral,
    WriteKind,
};
use crate::TransportError;

/// A device heard during `scan`
#[derive(Debug, Clone)]
pub struct ScannedDevice {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
    pub is_lamp: bool,
    pub in_dfu_mode: bool,
}

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, TransportError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters
        .into_iter()
        .next()
        .ok_or_else(|| TransportError::new("No Bluetooth adapter found"))
}

/// Scan for BLE devices
///
/// Returns every device heard within `duration`, flagging lamps (advertising
/// `lamp_service`) and lamps sitting in the bootloader (advertising `dfu_service`).
pub async fn scan(
    duration: Duration,
    lamp_service: Option<Uuid>,
    dfu_service: Uuid,
) -> Result<Vec<ScannedDevice>, TransportError> {
    let adapter = get_adapter().await?;

    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(duration).await;

    let peripherals = adapter.peripherals().await?;
    let mut devices = Vec::new();

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_else(|| "Unknown".to_string());
            let address = peripheral.address().to_string();
            let is_lamp = lamp_service.is_some_and(|s| props.services.contains(&s));
            let in_dfu_mode = props.services.contains(&dfu_service);

            devices.push(ScannedDevice { name, address, rssi: props.rssi, is_lamp, in_dfu_mode });
        }
    }

    adapter.stop_scan().await?;
    Ok(devices)
}

/// `Central` backed by a btleplug adapter
#[derive(Clone)]
pub struct BtleCentral {
    adapter: Adapter,
}

impl BtleCentral {
    /// Use the first Bluetooth adapter on this machine
    pub async fn new() -> Result<Self, TransportError> {
        Ok(Self { adapter: get_adapter().await? })
    }

    pub fn from_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }
}

fn peripheral_key(id: &PeripheralId) -> String {
    format!("{id:?}")
}

async fn advertisement(peripheral: PlatformPeripheral) -> Option<Advertisement<BtlePeripheral>> {
    let props = peripheral.properties().await.ok()??;
    Some(Advertisement {
        address: props.address.to_string(),
        local_name: props.local_name,
        services: props.services,
        rssi: props.rssi,
        peripheral: BtlePeripheral { inner: peripheral },
    })
}

impl Central for BtleCentral {
    type Peripheral = BtlePeripheral;

    async fn events(
        &self,
    ) -> Result<BoxStream<'static, CentralEvent<BtlePeripheral>>, TransportError> {
        let adapter = self.adapter.clone();
        let events = self.adapter.events().await?;

        Ok(events
            .filter_map(move |event| {
                let adapter = adapter.clone();
                async move {
                    match event {
                        BtleEvent::DeviceDiscovered(id)
                        | BtleEvent::DeviceUpdated(id)
                        | BtleEvent::ServicesAdvertisement { id, .. } => {
                            let peripheral = adapter.peripheral(&id).await.ok()?;
                            advertisement(peripheral).await.map(CentralEvent::Discovered)
                        }
                        BtleEvent::DeviceDisconnected(id) => {
                            Some(CentralEvent::Disconnected(peripheral_key(&id)))
                        }
                        _ => None,
                    }
                }
            })
            .boxed())
    }

    async fn start_scan(&self, services: Vec<Uuid>) -> Result<(), TransportError> {
        self.adapter.start_scan(ScanFilter { services }).await?;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        self.adapter.stop_scan().await?;
        Ok(())
    }
}

/// `Peripheral` backed by a btleplug peripheral
#[derive(Clone)]
pub struct BtlePeripheral {
    inner: PlatformPeripheral,
}

impl BtlePeripheral {
    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, TransportError> {
        self.inner
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| TransportError::new(format!("characteristic {uuid} not discovered")))
    }
}

impl Peripheral for BtlePeripheral {
    fn id(&self) -> String {
        peripheral_key(&self.inner.id())
    }

    async fn connect(&self) -> Result<(), TransportError> {
        self.inner.connect().await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.inner.disconnect().await?;
        Ok(())
    }

    async fn discover_services(&self) -> Result<Vec<GattService>, TransportError> {
        self.inner.discover_services().await?;

        Ok(self
            .inner
            .services()
            .into_iter()
            .map(|service| GattService {
                uuid: service.uuid,
                characteristics: service
                    .characteristics
                    .into_iter()
                    .map(|c| GattCharacteristic {
                        uuid: c.uuid,
                        descriptors: c.descriptors.into_iter().map(|d| d.uuid).collect(),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn write(
        &self,
        characteristic: Uuid,
        data: &[u8],
        kind: WriteKind,
    ) -> Result<(), TransportError> {
        let characteristic = self.characteristic(characteristic)?;
        let write_type = match kind {
            WriteKind::WithResponse => WriteType::WithResponse,
            WriteKind::WithoutResponse => WriteType::WithoutResponse,
        };
        self.inner.write(&characteristic, data, write_type).await?;
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<(), TransportError> {
        let characteristic = self.characteristic(characteristic)?;
        self.inner.subscribe(&characteristic).await?;
        Ok(())
    }

    async fn notifications(&self) -> Result<BoxStream<'static, Notification>, TransportError> {
        let stream = self.inner.notifications().await?;
        Ok(stream
            .map(|n| Notification { characteristic: n.uuid, value: n.value })
            .boxed())
    }

    async fn write_descriptor(
        &self,
        characteristic: Uuid,
        descriptor: Uuid,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let characteristic = self.characteristic(characteristic)?;
        let descriptor = characteristic
            .descriptors
            .iter()
            .find(|d| d.uuid == descriptor)
            .cloned()
            .ok_or_else(|| TransportError::new(format!("descriptor {descriptor} not discovered")))?;
        self.inner.write_descriptor(&descriptor, data).await?;
        Ok(())
    }
}
