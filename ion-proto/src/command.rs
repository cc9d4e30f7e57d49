//! Outbound commands written to the control characteristic

use crate::packet::{flag, name_bytes};
use crate::{
    BANK_SIZE, DeviceSettings, HEADER_LEN, MAX_ROTATION_LEN, NotificationConfig, OP_BEGIN_BOND,
    OP_CLEAR_NOTIFICATION, OP_ENTER_DFU_MODE, OP_GET_CURRENT_MOOD, OP_GET_DEVICE_SETTINGS,
    OP_GET_MOOD_CONFIG, OP_GET_NOTIFICATION_CONFIG, OP_GET_ROTATION, OP_INIT,
    OP_RESTORE_MOOD_CONFIGS, OP_SAVE_MOOD_CONFIGS, OP_SET_CURRENT_MOOD, OP_SET_DEVICE_NAME,
    OP_SET_DEVICE_SETTINGS, OP_SET_MOOD_CONFIG, OP_SET_NOTIFICATION_CONFIG, OP_SET_RAW_BANK,
    OP_SET_RAW_CLEAR_ALL, OP_SET_RAW_FILL_COLOR, OP_SET_RAW_LED, OP_SET_RAW_REFRESH, OP_SET_TIME,
    OP_SET_WEATHER, OP_SHOW_NOTIFICATION, OP_TRIGGER_NOTIFICATION, OP_UPDATE_ROTATION, Rgb,
    WeatherCondition,
};

/// Kind of client announced in the Init handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Ios,
    Android,
    /// Host-side driver (this crate)
    Host,
}

impl DeviceType {
    pub fn code(&self) -> u8 {
        match self {
            Self::Ios => 0x01,
            Self::Android => 0x02,
            Self::Host => 0x03,
        }
    }
}

/// Weather snapshot pushed to the lamp. Temperatures must already be clamped
/// to the `i8` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Weather {
    pub current_temp: i8,
    pub current_conditions: WeatherCondition,
    pub future_temp: i8,
    pub future_conditions: WeatherCondition,
    pub sunrise_hour: u8,
    pub sunrise_minute: u8,
    pub sunset_hour: u8,
    pub sunset_minute: u8,
}

/// One-off notification pattern shown immediately, without touching stored configs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotificationPattern {
    pub pattern_id: u8,
    pub hue: u16,
    pub brightness: u8,
    pub saturation: u8,
    pub speed: u8,
    pub duration: u8,
    pub sticky: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Init(DeviceType),
    SetDeviceName(String),
    GetDeviceSettings,
    SetDeviceSettings(DeviceSettings),
    SetWeather(Weather),
    SetTime { hour: u8, minute: u8, second: u8 },
    SetMoodConfig { mood_id: u8, config_id: u8, value: u32 },
    GetMoodConfig { mood_id: u8, config_id: u8 },
    SaveMoodConfigs,
    RestoreMoodConfigs,
    SetNotificationConfig(NotificationConfig),
    GetNotificationConfig { notification_id: u8 },
    SetCurrentMood { mood_id: u8 },
    GetCurrentMood,
    TriggerNotification { notification_id: u8 },
    UpdateRotation(Vec<u8>),
    GetRotation,
    EnterDfuMode,
    ShowNotification(NotificationPattern),
    BeginBond,
    ClearNotification,
    SetRawBank { bank_id: u8, colors: [Rgb; BANK_SIZE] },
    SetRawLed { led_id: u8, color: Rgb },
    SetRawClearAll,
    SetRawFillColor(Rgb),
    SetRawRefresh,
}

impl Command {
    pub fn op_code(&self) -> u8 {
        match self {
            Self::Init(_) => OP_INIT,
            Self::SetDeviceName(_) => OP_SET_DEVICE_NAME,
            Self::GetDeviceSettings => OP_GET_DEVICE_SETTINGS,
            Self::SetDeviceSettings(_) => OP_SET_DEVICE_SETTINGS,
            Self::SetWeather(_) => OP_SET_WEATHER,
            Self::SetTime { .. } => OP_SET_TIME,
            Self::SetMoodConfig { .. } => OP_SET_MOOD_CONFIG,
            Self::GetMoodConfig { .. } => OP_GET_MOOD_CONFIG,
            Self::SaveMoodConfigs => OP_SAVE_MOOD_CONFIGS,
            Self::RestoreMoodConfigs => OP_RESTORE_MOOD_CONFIGS,
            Self::SetNotificationConfig(_) => OP_SET_NOTIFICATION_CONFIG,
            Self::GetNotificationConfig { .. } => OP_GET_NOTIFICATION_CONFIG,
            Self::SetCurrentMood { .. } => OP_SET_CURRENT_MOOD,
            Self::GetCurrentMood => OP_GET_CURRENT_MOOD,
            Self::TriggerNotification { .. } => OP_TRIGGER_NOTIFICATION,
            Self::UpdateRotation(_) => OP_UPDATE_ROTATION,
            Self::GetRotation => OP_GET_ROTATION,
            Self::EnterDfuMode => OP_ENTER_DFU_MODE,
            Self::ShowNotification(_) => OP_SHOW_NOTIFICATION,
            Self::BeginBond => OP_BEGIN_BOND,
            Self::ClearNotification => OP_CLEAR_NOTIFICATION,
            Self::SetRawBank { .. } => OP_SET_RAW_BANK,
            Self::SetRawLed { .. } => OP_SET_RAW_LED,
            Self::SetRawClearAll => OP_SET_RAW_CLEAR_ALL,
            Self::SetRawFillColor(_) => OP_SET_RAW_FILL_COLOR,
            Self::SetRawRefresh => OP_SET_RAW_REFRESH,
        }
    }

    pub fn encode(&self, request_id: u8) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + 16);
        buf.push(request_id);
        buf.push(self.op_code());

        match self {
            Self::Init(device_type) => buf.push(device_type.code()),
            Self::SetDeviceName(name) => buf.extend(name_bytes(name)),
            Self::SetDeviceSettings(settings) => settings.write_to(&mut buf),
            Self::SetWeather(weather) => {
                buf.extend_from_slice(&weather.current_temp.to_le_bytes());
                buf.push(weather.current_conditions.code());
                buf.extend_from_slice(&weather.future_temp.to_le_bytes());
                buf.push(weather.future_conditions.code());
                buf.push(weather.sunrise_hour);
                buf.push(weather.sunrise_minute);
                buf.push(weather.sunset_hour);
                buf.push(weather.sunset_minute);
            }
            Self::SetTime { hour, minute, second } => {
                buf.extend_from_slice(&[*hour, *minute, *second]);
            }
            Self::SetMoodConfig { mood_id, config_id, value } => {
                buf.push(*mood_id);
                buf.push(*config_id);
                buf.extend_from_slice(&value.to_le_bytes());
            }
            Self::GetMoodConfig { mood_id, config_id } => {
                buf.push(*mood_id);
                buf.push(*config_id);
            }
            Self::SetNotificationConfig(config) => config.write_to(&mut buf),
            Self::GetNotificationConfig { notification_id }
            | Self::TriggerNotification { notification_id } => buf.push(*notification_id),
            Self::SetCurrentMood { mood_id } => buf.push(*mood_id),
            Self::UpdateRotation(moods) => buf.extend(moods.iter().take(MAX_ROTATION_LEN)),
            Self::ShowNotification(pattern) => {
                buf.push(pattern.pattern_id);
                buf.extend_from_slice(&pattern.hue.to_le_bytes());
                buf.push(pattern.brightness);
                buf.push(pattern.saturation);
                buf.push(pattern.speed);
                buf.push(pattern.duration);
                buf.push(flag(pattern.sticky));
            }
            Self::SetRawBank { bank_id, colors } => {
                buf.push(*bank_id);
                for color in colors {
                    buf.extend_from_slice(&color.to_bytes());
                }
            }
            Self::SetRawLed { led_id, color } => {
                buf.push(*led_id);
                buf.extend_from_slice(&color.to_bytes());
            }
            Self::SetRawFillColor(color) => buf.extend_from_slice(&color.to_bytes()),
            Self::GetDeviceSettings
            | Self::SaveMoodConfigs
            | Self::RestoreMoodConfigs
            | Self::GetCurrentMood
            | Self::GetRotation
            | Self::EnterDfuMode
            | Self::BeginBond
            | Self::ClearNotification
            | Self::SetRawClearAll
            | Self::SetRawRefresh => {}
        }
        buf
    }
}
