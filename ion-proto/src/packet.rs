//! Inbound packets - replies and events sent by the lamp on the notify characteristic

use crate::{
    EVENT_REQUEST_ID, HEADER_LEN, MAX_NAME_LEN, MAX_ROTATION_LEN, NakReason, OP_ACK,
    OP_GET_CURRENT_MOOD, OP_GET_DEVICE_SETTINGS, OP_GET_MOOD_CONFIG, OP_GET_NOTIFICATION_CONFIG,
    OP_GET_ROTATION, OP_INIT, OP_NAK, OP_SET_CURRENT_MOOD, OP_SET_DEVICE_NAME,
    OP_SET_DEVICE_SETTINGS, OP_SET_MOOD_CONFIG, OP_SET_NOTIFICATION_CONFIG, OP_UPDATE_ROTATION,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("packet too short for a header: {0} bytes")]
    MissingHeader(usize),
    #[error("packet with op code 0x{op_code:02x} truncated: expected {expected} bytes, got {got}")]
    Truncated { op_code: u8, expected: usize, got: usize },
}

/// Reply to the Init handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub protocol_version: u16,
    pub firmware_version: u16,
    pub bonded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceSettings {
    pub knock_enabled: bool,
    pub quiet_time_enabled: bool,
    pub quiet_hour_start: u8,
    pub quiet_minute_start: u8,
    pub quiet_hour_end: u8,
    pub quiet_minute_end: u8,
    /// Minutes between mood shuffles, zero disables shuffling
    pub shuffle_time: u8,
    pub notifications_enabled: bool,
    pub leash_enabled: bool,
}

impl DeviceSettings {
    pub const WIRE_LEN: usize = 9;

    pub fn shuffle_enabled(&self) -> bool {
        self.shuffle_time != 0
    }

    pub(crate) fn write_to(&self, buf: &mut Vec<u8>) {
        buf.push(flag(self.knock_enabled));
        buf.push(flag(self.quiet_time_enabled));
        buf.push(self.quiet_hour_start);
        buf.push(self.quiet_minute_start);
        buf.push(self.quiet_hour_end);
        buf.push(self.quiet_minute_end);
        buf.push(self.shuffle_time);
        buf.push(flag(self.notifications_enabled));
        buf.push(flag(self.leash_enabled));
    }

    fn read_from(data: &[u8]) -> Self {
        Self {
            knock_enabled: data[0] != 0,
            quiet_time_enabled: data[1] != 0,
            quiet_hour_start: data[2],
            quiet_minute_start: data[3],
            quiet_hour_end: data[4],
            quiet_minute_end: data[5],
            shuffle_time: data[6],
            notifications_enabled: data[7] != 0,
            leash_enabled: data[8] != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoodConfig {
    pub mood_id: u8,
    pub config_id: u8,
    pub value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotificationConfig {
    pub notification_id: u8,
    pub enabled: bool,
    pub pattern_id: u8,
    pub hue: u16,
    pub brightness: u8,
    pub saturation: u8,
    pub speed: u8,
    pub duration: u8,
    pub sticky: bool,
}

impl NotificationConfig {
    pub const WIRE_LEN: usize = 10;

    pub(crate) fn write_to(&self, buf: &mut Vec<u8>) {
        buf.push(self.notification_id);
        buf.push(flag(self.enabled));
        buf.push(self.pattern_id);
        buf.extend_from_slice(&self.hue.to_le_bytes());
        buf.push(self.brightness);
        buf.push(self.saturation);
        buf.push(self.speed);
        buf.push(self.duration);
        buf.push(flag(self.sticky));
    }

    fn read_from(data: &[u8]) -> Self {
        Self {
            notification_id: data[0],
            enabled: data[1] != 0,
            pattern_id: data[2],
            hue: u16::from_le_bytes([data[3], data[4]]),
            brightness: data[5],
            saturation: data[6],
            speed: data[7],
            duration: data[8],
            sticky: data[9] != 0,
        }
    }
}

/// Typed payload of an inbound packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Ack,
    Nak(NakReason),
    FirmwareVersion(FirmwareVersion),
    DeviceName(String),
    DeviceSettings(DeviceSettings),
    MoodConfig(MoodConfig),
    NotificationConfig(NotificationConfig),
    CurrentMood(u8),
    Rotation(Vec<u8>),
    /// Op code this driver does not know, kept verbatim
    Unknown(Vec<u8>),
}

/// A decoded packet. `op_code` is kept next to the body because several op
/// codes (get and set variants) share one payload layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub request_id: u8,
    pub op_code: u8,
    pub body: Body,
}

impl Packet {
    /// Build a packet using the canonical op code for `body`. `Body::Unknown`
    /// has no canonical op code, construct the struct directly for those.
    pub fn new(request_id: u8, body: Body) -> Self {
        let op_code = match &body {
            Body::Ack => OP_ACK,
            Body::Nak(_) => OP_NAK,
            Body::FirmwareVersion(_) => OP_INIT,
            Body::DeviceName(_) => OP_SET_DEVICE_NAME,
            Body::DeviceSettings(_) => OP_GET_DEVICE_SETTINGS,
            Body::MoodConfig(_) => OP_GET_MOOD_CONFIG,
            Body::NotificationConfig(_) => OP_GET_NOTIFICATION_CONFIG,
            Body::CurrentMood(_) => OP_GET_CURRENT_MOOD,
            Body::Rotation(_) => OP_GET_ROTATION,
            Body::Unknown(_) => 0,
        };
        Self { request_id, op_code, body }
    }

    /// True for packets the lamp sent on its own rather than in reply to a request
    pub fn is_event(&self) -> bool {
        self.request_id == EVENT_REQUEST_ID
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < HEADER_LEN {
            return Err(DecodeError::MissingHeader(data.len()));
        }

        let request_id = data[0];
        let op_code = data[1];
        let payload = &data[HEADER_LEN..];

        let need = |len: usize| -> Result<(), DecodeError> {
            if payload.len() < len {
                return Err(DecodeError::Truncated {
                    op_code,
                    expected: HEADER_LEN + len,
                    got: data.len(),
                });
            }
            Ok(())
        };

        let body = match op_code {
            OP_ACK => Body::Ack,
            OP_NAK => {
                need(1)?;
                Body::Nak(NakReason::from_code(payload[0]))
            }
            OP_INIT => {
                need(5)?;
                Body::FirmwareVersion(FirmwareVersion {
                    protocol_version: u16::from_le_bytes([payload[0], payload[1]]),
                    firmware_version: u16::from_le_bytes([payload[2], payload[3]]),
                    bonded: payload[4] != 0,
                })
            }
            OP_SET_DEVICE_NAME => Body::DeviceName(payload.iter().map(|b| *b as char).collect()),
            OP_GET_DEVICE_SETTINGS | OP_SET_DEVICE_SETTINGS => {
                need(DeviceSettings::WIRE_LEN)?;
                Body::DeviceSettings(DeviceSettings::read_from(payload))
            }
            OP_GET_MOOD_CONFIG | OP_SET_MOOD_CONFIG => {
                need(6)?;
                Body::MoodConfig(MoodConfig {
                    mood_id: payload[0],
                    config_id: payload[1],
                    value: u32::from_le_bytes([payload[2], payload[3], payload[4], payload[5]]),
                })
            }
            OP_GET_NOTIFICATION_CONFIG | OP_SET_NOTIFICATION_CONFIG => {
                need(NotificationConfig::WIRE_LEN)?;
                Body::NotificationConfig(NotificationConfig::read_from(payload))
            }
            OP_GET_CURRENT_MOOD | OP_SET_CURRENT_MOOD => {
                need(1)?;
                Body::CurrentMood(payload[0])
            }
            OP_GET_ROTATION | OP_UPDATE_ROTATION => Body::Rotation(payload.to_vec()),
            _ => Body::Unknown(payload.to_vec()),
        };

        Ok(Self { request_id, op_code, body })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + 12);
        buf.push(self.request_id);
        buf.push(self.op_code);

        match &self.body {
            Body::Ack => {}
            Body::Nak(reason) => buf.push(reason.code()),
            Body::FirmwareVersion(version) => {
                buf.extend_from_slice(&version.protocol_version.to_le_bytes());
                buf.extend_from_slice(&version.firmware_version.to_le_bytes());
                buf.push(flag(version.bonded));
            }
            Body::DeviceName(name) => buf.extend(name_bytes(name)),
            Body::DeviceSettings(settings) => settings.write_to(&mut buf),
            Body::MoodConfig(config) => {
                buf.push(config.mood_id);
                buf.push(config.config_id);
                buf.extend_from_slice(&config.value.to_le_bytes());
            }
            Body::NotificationConfig(config) => config.write_to(&mut buf),
            Body::CurrentMood(mood_id) => buf.push(*mood_id),
            Body::Rotation(moods) => buf.extend(moods.iter().take(MAX_ROTATION_LEN)),
            Body::Unknown(payload) => buf.extend_from_slice(payload),
        }
        buf
    }
}

pub(crate) fn flag(value: bool) -> u8 {
    if value { 0x01 } else { 0x00 }
}

/// Names travel as one byte per character; anything outside Latin-1 becomes '?'
pub(crate) fn name_bytes(name: &str) -> impl Iterator<Item = u8> + '_ {
    name.chars()
        .take(MAX_NAME_LEN)
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
}
