//! BLE GATT constants for the DFU bootloader
//!
//! The lamp's bootloader exposes the Nordic legacy DFU service. UUIDs are kept
//! as `u128` so this crate stays free of a uuid dependency; the controller
//! turns them into `uuid::Uuid` with `Uuid::from_u128`.

/// DFU Service UUID: 00001530-1212-efde-1523-785feabcd123
pub const DFU_SERVICE_UUID: u128 = 0x00001530_1212_efde_1523_785feabcd123;

/// DFU Control Point Characteristic UUID (write/notify)
pub const DFU_CONTROL_POINT_UUID: u128 = 0x00001531_1212_efde_1523_785feabcd123;

/// DFU Packet Characteristic UUID (write without response)
pub const DFU_PACKET_UUID: u128 = 0x00001532_1212_efde_1523_785feabcd123;

/// Client Characteristic Configuration Descriptor UUID
pub const CCCD_UUID: u128 = 0x00002902_0000_1000_8000_00805f9b34fb;

/// CCCD value that turns notifications on
pub const CCCD_ENABLE_NOTIFICATIONS: [u8; 2] = [0x01, 0x00];

/// Bytes per firmware chunk written to the packet characteristic
pub const DFU_DEFAULT_CHUNK_SIZE: usize = 20;
