//! Firmware update against a lamp sitting in its bootloader
//!
//! Nordic legacy DFU: arm notifications on the control point, START_DFU with
//! the image size, RECEIVE the image in chunks, VALIDATE, then ACTIVATE. The
//! update counts as done once the bootloader drops the link after ACTIVATE.

use futures::StreamExt;
use futures::stream::BoxStream;
use ion_proto::ble::CCCD_ENABLE_NOTIFICATIONS;
use ion_proto::dfu::{
    ControlResponse, DfuStatus, OP_ACTIVATE_AND_RESET, OP_RECEIVE_FIRMWARE_IMAGE, OP_START_DFU,
    OP_VALIDATE_FIRMWARE_IMAGE, RESPONSE_CODE, image_size_packet,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::DfuConfig;
use crate::transport::{Central, CentralEvent, Notification, Peripheral, WriteKind};
use crate::DfuError;

/// Firmware image split into packet-sized chunks
#[derive(Debug, Clone)]
pub struct FirmwareTransfer {
    image: Vec<u8>,
    chunk_size: usize,
    bytes_sent: usize,
}

impl FirmwareTransfer {
    pub fn new(image: Vec<u8>, chunk_size: usize) -> Self {
        Self { image, chunk_size: chunk_size.max(1), bytes_sent: 0 }
    }

    pub fn len(&self) -> usize {
        self.image.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    pub fn is_done(&self) -> bool {
        self.bytes_sent >= self.image.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.image.len().div_ceil(self.chunk_size)
    }

    pub fn next_chunk(&mut self) -> Option<&[u8]> {
        if self.is_done() {
            return None;
        }
        let start = self.bytes_sent;
        let end = (start + self.chunk_size).min(self.image.len());
        self.bytes_sent = end;
        Some(&self.image[start..end])
    }

    /// Percent of the image sent; an empty image is complete from the start
    pub fn progress(&self) -> f64 {
        if self.image.is_empty() {
            return 100.0;
        }
        self.bytes_sent as f64 * 100.0 / self.image.len() as f64
    }
}

/// Where an update is, reported through the progress callback
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DfuStage {
    Scanning,
    Connecting,
    DiscoveringServices,
    EnablingNotifications,
    Starting,
    Uploading { sent: usize, total: usize },
    Validating,
    Activating,
    Complete,
}

impl DfuStage {
    pub fn percent(&self) -> Option<f64> {
        match self {
            Self::Uploading { total: 0, .. } => Some(100.0),
            Self::Uploading { sent, total } => Some(*sent as f64 * 100.0 / *total as f64),
            Self::Complete => Some(100.0),
            _ => None,
        }
    }
}

impl std::fmt::Display for DfuStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scanning => write!(f, "Scanning for device in DFU mode"),
            Self::Connecting => write!(f, "Connecting"),
            Self::DiscoveringServices => write!(f, "Discovering DFU service"),
            Self::EnablingNotifications => write!(f, "Enabling control point notifications"),
            Self::Starting => write!(f, "Starting DFU"),
            Self::Uploading { sent, total } => write!(f, "Uploading firmware: {sent}/{total} bytes"),
            Self::Validating => write!(f, "Validating firmware"),
            Self::Activating => write!(f, "Activating firmware"),
            Self::Complete => write!(f, "Update complete"),
        }
    }
}

struct DfuLink<P> {
    peripheral: P,
    id: String,
    control_point: Uuid,
    packet: Uuid,
    notifications: BoxStream<'static, Notification>,
    events: BoxStream<'static, CentralEvent<P>>,
}

impl<P: Peripheral> DfuLink<P> {
    async fn control(&self, data: &[u8]) -> Result<(), DfuError> {
        self.peripheral.write(self.control_point, data, WriteKind::WithResponse).await?;
        Ok(())
    }

    async fn packet(&self, data: &[u8]) -> Result<(), DfuError> {
        self.peripheral.write(self.packet, data, WriteKind::WithResponse).await?;
        Ok(())
    }

    /// Wait for the control point to answer `op`
    async fn response(&mut self, op: u8) -> Result<(), DfuError> {
        loop {
            tokio::select! {
                notification = self.notifications.next() => {
                    let Some(notification) = notification else {
                        return Err(DfuError::ConnectionLost);
                    };
                    if notification.characteristic != self.control_point
                        || notification.value.first() != Some(&RESPONSE_CODE)
                    {
                        continue;
                    }
                    let Some(response) = ControlResponse::parse(&notification.value) else {
                        debug!(value = ?notification.value, "ignoring control point notification");
                        continue;
                    };
                    if response.request_op != op {
                        debug!(op = response.request_op, "response for another op");
                        continue;
                    }
                    return match response.status {
                        DfuStatus::Success => Ok(()),
                        status => Err(DfuError::Rejected { op, status }),
                    };
                }
                event = self.events.next() => match event {
                    Some(CentralEvent::Disconnected(id)) if id == self.id => {
                        return Err(DfuError::ConnectionLost);
                    }
                    Some(_) => continue,
                    None => return Err(DfuError::ConnectionLost),
                },
            }
        }
    }

    async fn wait_for_disconnect(&mut self) {
        while let Some(event) = self.events.next().await {
            if matches!(&event, CentralEvent::Disconnected(id) if *id == self.id) {
                return;
            }
        }
    }
}

async fn find_bootloader<C: Central>(
    central: &C,
    events: &mut BoxStream<'static, CentralEvent<C::Peripheral>>,
    service: Uuid,
) -> Result<C::Peripheral, DfuError> {
    central.start_scan(vec![service]).await?;

    while let Some(event) = events.next().await {
        if let CentralEvent::Discovered(advertisement) = event {
            if advertisement.services.contains(&service) {
                central.stop_scan().await?;
                info!(address = %advertisement.address, "found device in DFU mode");
                return Ok(advertisement.peripheral);
            }
        }
    }

    Err(DfuError::DeviceNotFound)
}

/// Flash `image` onto the first device advertising the DFU service
pub async fn update_firmware<C: Central>(
    central: &C,
    image: Vec<u8>,
    config: &DfuConfig,
    mut progress: impl FnMut(DfuStage),
) -> Result<(), DfuError> {
    let size = u32::try_from(image.len()).map_err(|_| DfuError::ImageTooLarge(image.len()))?;
    let mut transfer = FirmwareTransfer::new(image, config.chunk_size);

    progress(DfuStage::Scanning);
    let mut events = central.events().await?;
    let peripheral = find_bootloader(central, &mut events, config.service_uuid).await?;

    progress(DfuStage::Connecting);
    peripheral.connect().await?;

    progress(DfuStage::DiscoveringServices);
    let services = peripheral.discover_services().await?;
    let service = services
        .iter()
        .find(|s| s.uuid == config.service_uuid)
        .ok_or(DfuError::ServiceNotFound(config.service_uuid))?;
    let control_point = service
        .characteristics
        .iter()
        .find(|c| c.uuid == config.control_point_uuid)
        .ok_or(DfuError::CharacteristicNotFound(config.control_point_uuid))?;
    if !service.characteristics.iter().any(|c| c.uuid == config.packet_uuid) {
        return Err(DfuError::CharacteristicNotFound(config.packet_uuid));
    }
    if !control_point.descriptors.contains(&config.cccd_uuid) {
        return Err(DfuError::CccdNotFound);
    }

    progress(DfuStage::EnablingNotifications);
    let notifications = peripheral.notifications().await?;
    peripheral.subscribe(config.control_point_uuid).await?;
    peripheral
        .write_descriptor(config.control_point_uuid, config.cccd_uuid, &CCCD_ENABLE_NOTIFICATIONS)
        .await?;

    let mut link = DfuLink {
        id: peripheral.id(),
        peripheral,
        control_point: config.control_point_uuid,
        packet: config.packet_uuid,
        notifications,
        events,
    };

    progress(DfuStage::Starting);
    link.control(&[OP_START_DFU]).await?;
    link.packet(&image_size_packet(size)).await?;
    link.response(OP_START_DFU).await?;

    info!(bytes = size, chunks = transfer.chunk_count(), "uploading firmware");
    link.control(&[OP_RECEIVE_FIRMWARE_IMAGE]).await?;
    progress(DfuStage::Uploading { sent: 0, total: transfer.len() });
    while let Some(chunk) = transfer.next_chunk() {
        link.packet(chunk).await?;
        progress(DfuStage::Uploading { sent: transfer.bytes_sent(), total: transfer.len() });
    }
    link.response(OP_RECEIVE_FIRMWARE_IMAGE).await?;

    progress(DfuStage::Validating);
    link.control(&[OP_VALIDATE_FIRMWARE_IMAGE]).await?;
    link.response(OP_VALIDATE_FIRMWARE_IMAGE).await?;

    progress(DfuStage::Activating);
    link.control(&[OP_ACTIVATE_AND_RESET]).await?;
    if let Err(e) = link.peripheral.disconnect().await {
        // the bootloader may already have reset
        debug!("disconnect after activate: {e}");
    }
    link.wait_for_disconnect().await;

    info!("firmware update complete");
    progress(DfuStage::Complete);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCentral;
    use std::time::Duration;

    fn control_response(op: u8, status: u8) -> Vec<Notification> {
        vec![Notification {
            characteristic: DfuConfig::default().control_point_uuid,
            value: vec![RESPONSE_CODE, op, status],
        }]
    }

    /// Behaves like the bootloader; `start_status` answers START_DFU and
    /// VALIDATE is only answered when `validate` is set
    fn bootloader(start_status: u8, validate: bool) -> MockCentral {
        let config = DfuConfig::default();
        let mut expected: Option<usize> = None;
        let mut receiving = false;
        let mut received = 0;

        MockCentral::dfu(Box::new(move |characteristic, data| {
            if characteristic == config.packet_uuid {
                if receiving {
                    received += data.len();
                    if Some(received) == expected {
                        return control_response(OP_RECEIVE_FIRMWARE_IMAGE, 1);
                    }
                    return Vec::new();
                }
                if expected.is_none() && data.len() == 4 {
                    expected = Some(u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize);
                    return control_response(OP_START_DFU, start_status);
                }
                return Vec::new();
            }
            match data {
                [OP_RECEIVE_FIRMWARE_IMAGE] => {
                    receiving = true;
                    if expected == Some(0) {
                        return control_response(OP_RECEIVE_FIRMWARE_IMAGE, 1);
                    }
                    Vec::new()
                }
                [OP_VALIDATE_FIRMWARE_IMAGE] if validate => control_response(OP_VALIDATE_FIRMWARE_IMAGE, 1),
                _ => Vec::new(),
            }
        }))
    }

    #[test]
    fn transfer_chunks() {
        let mut transfer = FirmwareTransfer::new((0..45).collect(), 20);
        assert_eq!(transfer.chunk_count(), 3);

        let lengths: Vec<_> = std::iter::from_fn(|| transfer.next_chunk().map(<[u8]>::len)).collect();
        assert_eq!(lengths, vec![20, 20, 5]);
        assert!(transfer.is_done());
        assert_eq!(transfer.progress(), 100.0);
    }

    #[test]
    fn exact_multiple_has_full_last_chunk() {
        let mut transfer = FirmwareTransfer::new(vec![7; 40], 20);
        assert_eq!(transfer.chunk_count(), 2);
        assert_eq!(transfer.next_chunk().map(<[u8]>::len), Some(20));
        assert_eq!(transfer.progress(), 50.0);
        assert_eq!(transfer.next_chunk().map(<[u8]>::len), Some(20));
        assert_eq!(transfer.next_chunk(), None);
    }

    #[test]
    fn empty_image_is_done() {
        let mut transfer = FirmwareTransfer::new(Vec::new(), 20);
        assert_eq!(transfer.chunk_count(), 0);
        assert!(transfer.is_done());
        assert_eq!(transfer.next_chunk(), None);
        assert_eq!(transfer.progress(), 100.0);
        assert_eq!(DfuStage::Uploading { sent: 0, total: 0 }.percent(), Some(100.0));
    }

    #[tokio::test(start_paused = true)]
    async fn full_update() {
        let central = bootloader(1, true);
        let config = DfuConfig::default();
        let image: Vec<u8> = (0..45).collect();
        let mut stages = Vec::new();

        update_firmware(&central, image.clone(), &config, |stage| stages.push(stage))
            .await
            .unwrap();

        let peripheral = central.peripheral();
        assert_eq!(
            peripheral.descriptor_writes(),
            vec![(config.control_point_uuid, config.cccd_uuid, vec![1, 0])]
        );
        assert_eq!(
            peripheral.writes_to(config.control_point_uuid),
            vec![
                vec![OP_START_DFU],
                vec![OP_RECEIVE_FIRMWARE_IMAGE],
                vec![OP_VALIDATE_FIRMWARE_IMAGE],
                vec![OP_ACTIVATE_AND_RESET],
            ]
        );

        let packets = peripheral.writes_to(config.packet_uuid);
        assert_eq!(packets[0], vec![45, 0, 0, 0]);
        assert_eq!(packets[1..].concat(), image);
        assert_eq!(packets.len(), 4);
        assert_eq!(peripheral.disconnects(), 1);

        assert_eq!(stages.first(), Some(&DfuStage::Scanning));
        assert_eq!(stages.last(), Some(&DfuStage::Complete));
        assert!(stages.contains(&DfuStage::Uploading { sent: 45, total: 45 }));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_start() {
        let central = bootloader(DfuStatus::DataSizeExceedsLimits.code(), true);

        let result = update_firmware(&central, vec![0; 64], &DfuConfig::default(), |_| {}).await;
        assert!(matches!(
            result,
            Err(DfuError::Rejected { op: OP_START_DFU, status: DfuStatus::DataSizeExceedsLimits })
        ));
        assert_eq!(central.peripheral().writes_to(DfuConfig::default().packet_uuid).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn link_lost_before_activate() {
        let central = bootloader(1, false);
        let peripheral = central.peripheral().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            peripheral.drop_link();
        });

        let result = update_firmware(&central, vec![0; 30], &DfuConfig::default(), |_| {}).await;
        assert!(matches!(result, Err(DfuError::ConnectionLost)));
        assert!(
            !central
                .peripheral()
                .writes_to(DfuConfig::default().control_point_uuid)
                .contains(&vec![OP_ACTIVATE_AND_RESET])
        );
    }
}
