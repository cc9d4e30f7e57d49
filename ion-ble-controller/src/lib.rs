//! ION BLE Controller
//!
//! Host-side driver for ION lamps: discovery, the command/reply protocol,
//! mood and notification configuration, the raw LED buffer, weather pushes
//! and firmware updates.
//!
//! # Example
//!
//! ```ignore
//! use ion_ble_controller::{BtleCentral, Catalog, Config, Lamp, ion_home};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let home = ion_home()?;
//!     let config = Config::load(&home)?;
//!     let catalog = Catalog::load(&home.join("catalog.json"))?;
//!
//!     let lamp = Lamp::new(BtleCentral::new().await?, "ION-1", config.lamp()?.clone(), catalog);
//!     lamp.connect().await?;
//!     lamp.set_mood("digital rain").await?;
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod catalog;
mod commands;
pub mod config;
mod correlator;
pub mod dfu;
mod error;
mod lamp;
mod raw_buffer;
pub mod transport;
pub mod weather;

#[cfg(test)]
mod mock;

pub use ble::{BtleCentral, BtlePeripheral, ScannedDevice};
pub use catalog::Catalog;
pub use commands::{ConfigValue, NotificationStyle};
pub use config::{Config, DfuConfig, LampConfig, ion_home};
pub use correlator::{Correlator, Routed};
pub use dfu::{DfuStage, FirmwareTransfer, update_firmware};
pub use error::{ConfigError, DfuError, LampError, TransportError, WeatherError};
pub use lamp::{Lamp, LampEvent, Mood, SessionState};
pub use raw_buffer::RawLedBuffer;
pub use weather::{OpenWeatherMap, WeatherReport, WeatherSource};
