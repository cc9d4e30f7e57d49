//! Driver configuration, loaded from `$ION_HOME/config.json`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ConfigError;

/// Everything `ion-ble` reads from `config.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Lamp GATT layout, required for every lamp command
    #[serde(default)]
    pub lamp: Option<LampConfig>,
    #[serde(default)]
    pub dfu: DfuConfig,
    /// OpenWeatherMap `appid`
    #[serde(default)]
    pub weather_api_key: Option<String>,
}

impl Config {
    /// Load `config.json` from `home`. A missing file yields the defaults.
    pub fn load(home: &Path) -> Result<Self, ConfigError> {
        let path = home.join("config.json");
        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Json { path, source })
    }

    pub fn lamp(&self) -> Result<&LampConfig, ConfigError> {
        self.lamp.as_ref().ok_or(ConfigError::Missing("lamp"))
    }
}

/// `$ION_HOME`, or `~/.ion` when unset
pub fn ion_home() -> Result<PathBuf, ConfigError> {
    if let Ok(home) = std::env::var("ION_HOME") {
        return Ok(PathBuf::from(home));
    }
    dirs::home_dir()
        .map(|home| home.join(".ion"))
        .ok_or(ConfigError::NoHome)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LampConfig {
    pub service_uuid: Uuid,
    /// Commands are written here
    pub control_uuid: Uuid,
    /// Replies and events arrive here
    pub notify_uuid: Uuid,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u16,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_weather_refresh_secs")]
    pub weather_refresh_secs: u64,
    #[serde(default = "default_weather_retry_secs")]
    pub weather_retry_secs: u64,
}

fn default_protocol_version() -> u16 {
    ion_proto::SUPPORTED_PROTOCOL_VERSION
}

fn default_reconnect_delay_ms() -> u64 {
    2_000
}

fn default_weather_refresh_secs() -> u64 {
    15 * 60
}

fn default_weather_retry_secs() -> u64 {
    3 * 60
}

impl LampConfig {
    pub fn new(service_uuid: Uuid, control_uuid: Uuid, notify_uuid: Uuid) -> Self {
        Self {
            service_uuid,
            control_uuid,
            notify_uuid,
            protocol_version: default_protocol_version(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            weather_refresh_secs: default_weather_refresh_secs(),
            weather_retry_secs: default_weather_retry_secs(),
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Delay before the next weather push after a successful one
    pub fn weather_refresh(&self) -> Duration {
        Duration::from_secs(self.weather_refresh_secs)
    }

    /// Delay before the next weather push after a failed one
    pub fn weather_retry(&self) -> Duration {
        Duration::from_secs(self.weather_retry_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DfuConfig {
    pub service_uuid: Uuid,
    pub control_point_uuid: Uuid,
    pub packet_uuid: Uuid,
    pub cccd_uuid: Uuid,
    pub chunk_size: usize,
}

impl Default for DfuConfig {
    fn default() -> Self {
        use ion_proto::ble::*;

        Self {
            service_uuid: Uuid::from_u128(DFU_SERVICE_UUID),
            control_point_uuid: Uuid::from_u128(DFU_CONTROL_POINT_UUID),
            packet_uuid: Uuid::from_u128(DFU_PACKET_UUID),
            cccd_uuid: Uuid::from_u128(CCCD_UUID),
            chunk_size: DFU_DEFAULT_CHUNK_SIZE,
        }
    }
}
