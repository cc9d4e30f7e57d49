//! ION wire protocol - op codes, packet encoding and decoding
//!
//! Every packet starts with a two byte header `[request_id, op_code]`. Multi-byte
//! integers are little-endian, booleans are a single `0x00`/`0x01` byte.

pub mod ble;
mod command;
pub mod dfu;
mod packet;

pub use command::{Command, DeviceType, NotificationPattern, Weather};
pub use packet::{
    Body, DecodeError, DeviceSettings, FirmwareVersion, MoodConfig, NotificationConfig, Packet,
};

/// Protocol version this driver speaks, compared against the Init reply
pub const SUPPORTED_PROTOCOL_VERSION: u16 = 0x0001;

/// Request id the lamp uses for events nobody asked for (mood changed, ...)
pub const EVENT_REQUEST_ID: u8 = 0xFF;

/// Highest request id handed out before wrapping back to zero
pub const MAX_REQUEST_ID: u8 = 0xFE;

pub const HEADER_LEN: usize = 2;

/// Device names and rotation lists are cut to this many entries before encoding
pub const MAX_NAME_LEN: usize = 18;
pub const MAX_ROTATION_LEN: usize = 18;

// Raw mode geometry
pub const LED_COUNT: usize = 40;
pub const BANK_SIZE: usize = 5;
pub const BANK_COUNT: usize = LED_COUNT / BANK_SIZE;

// Op codes
pub const OP_ACK: u8 = 0x01;
pub const OP_NAK: u8 = 0x02;
pub const OP_INIT: u8 = 0x03;
pub const OP_SET_DEVICE_NAME: u8 = 0x04;
pub const OP_GET_DEVICE_SETTINGS: u8 = 0x05;
pub const OP_SET_DEVICE_SETTINGS: u8 = 0x06;
pub const OP_SET_WEATHER: u8 = 0x07;
pub const OP_SET_TIME: u8 = 0x08;
pub const OP_SET_MOOD_CONFIG: u8 = 0x09;
pub const OP_GET_MOOD_CONFIG: u8 = 0x0A;
pub const OP_SAVE_MOOD_CONFIGS: u8 = 0x0B;
pub const OP_RESTORE_MOOD_CONFIGS: u8 = 0x0C;
pub const OP_SET_NOTIFICATION_CONFIG: u8 = 0x0D;
pub const OP_GET_NOTIFICATION_CONFIG: u8 = 0x0E;
pub const OP_SET_CURRENT_MOOD: u8 = 0x0F;
pub const OP_GET_CURRENT_MOOD: u8 = 0x10;
pub const OP_TRIGGER_NOTIFICATION: u8 = 0x11;
pub const OP_UPDATE_ROTATION: u8 = 0x12;
pub const OP_GET_ROTATION: u8 = 0x13;
pub const OP_ENTER_DFU_MODE: u8 = 0x14;
pub const OP_SHOW_NOTIFICATION: u8 = 0x15;
/// Reserved by the firmware, no payload layout is defined for it
pub const OP_SET_RAW_SETTINGS: u8 = 0x16;
pub const OP_BEGIN_BOND: u8 = 0x17;
pub const OP_CLEAR_NOTIFICATION: u8 = 0x18;
pub const OP_SET_RAW_BANK: u8 = 0x19;
pub const OP_SET_RAW_LED: u8 = 0x1A;
pub const OP_SET_RAW_CLEAR_ALL: u8 = 0x1B;
pub const OP_SET_RAW_FILL_COLOR: u8 = 0x1C;
pub const OP_SET_RAW_REFRESH: u8 = 0x1D;

/// Reason carried by a Nak packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NakReason {
    InvalidOpCode,
    UnknownDeviceType,
    InvalidDeviceName,
    InvalidDeviceSettings,
    InvalidWeather,
    InvalidTime,
    InvalidMoodConfig,
    UnknownMood,
    UnknownMoodConfig,
    InvalidNotificationConfig,
    UnknownNotification,
    InvalidRotation,
    BondFailed,
    NoBond,
    NotInitialized,
    /// A reason code newer than this driver
    Unknown(u8),
}

impl NakReason {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => Self::InvalidOpCode,
            0x02 => Self::UnknownDeviceType,
            0x03 => Self::InvalidDeviceName,
            0x04 => Self::InvalidDeviceSettings,
            0x05 => Self::InvalidWeather,
            0x06 => Self::InvalidTime,
            0x07 => Self::InvalidMoodConfig,
            0x08 => Self::UnknownMood,
            0x09 => Self::UnknownMoodConfig,
            0x0A => Self::InvalidNotificationConfig,
            0x0B => Self::UnknownNotification,
            0x0C => Self::InvalidRotation,
            0x0D => Self::BondFailed,
            0x0E => Self::NoBond,
            0x0F => Self::NotInitialized,
            other => Self::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::InvalidOpCode => 0x01,
            Self::UnknownDeviceType => 0x02,
            Self::InvalidDeviceName => 0x03,
            Self::InvalidDeviceSettings => 0x04,
            Self::InvalidWeather => 0x05,
            Self::InvalidTime => 0x06,
            Self::InvalidMoodConfig => 0x07,
            Self::UnknownMood => 0x08,
            Self::UnknownMoodConfig => 0x09,
            Self::InvalidNotificationConfig => 0x0A,
            Self::UnknownNotification => 0x0B,
            Self::InvalidRotation => 0x0C,
            Self::BondFailed => 0x0D,
            Self::NoBond => 0x0E,
            Self::NotInitialized => 0x0F,
            Self::Unknown(code) => *code,
        }
    }
}

impl std::fmt::Display for NakReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "unknown nak reason 0x{code:02x}"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Weather conditions understood by the lamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeatherCondition {
    Clear,
    Clouds,
    Rain,
    Snow,
    Thunderstorm,
    Hazy,
}

impl WeatherCondition {
    pub fn code(&self) -> u8 {
        match self {
            Self::Clear => 0x01,
            Self::Clouds => 0x02,
            Self::Rain => 0x03,
            Self::Snow => 0x04,
            Self::Thunderstorm => 0x05,
            Self::Hazy => 0x06,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::Clear),
            0x02 => Some(Self::Clouds),
            0x03 => Some(Self::Rain),
            0x04 => Some(Self::Snow),
            0x05 => Some(Self::Thunderstorm),
            0x06 => Some(Self::Hazy),
            _ => None,
        }
    }
}

/// One LED color, sent on the wire as three bytes R, G, B
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_bytes(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}
