use ion_proto::NakReason;
use ion_proto::dfu::DfuStatus;
use uuid::Uuid;

/// Failure reported by the BLE stack (connect, discover, write, ...)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<btleplug::Error> for TransportError {
    fn from(e: btleplug::Error) -> Self {
        Self(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LampError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("lamp rejected command: {0}")]
    Nak(NakReason),
    #[error("unknown mood: {0}")]
    UnknownMood(String),
    #[error("unknown notification: {0}")]
    UnknownNotification(String),
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("protocol version mismatch: lamp speaks 0x{found:04x}, driver supports 0x{supported:04x}")]
    ProtocolMismatch { found: u16, supported: u16 },
    #[error("could not find service {0}")]
    ServiceNotFound(Uuid),
    #[error("could not find characteristic {0}")]
    CharacteristicNotFound(Uuid),
    #[error("no lamp matching {0:?} was found")]
    LampNotFound(String),
    #[error("lamp is not ready")]
    NotReady,
    #[error("lamp disconnected before replying")]
    Disconnected,
    #[error("received packet with unknown op code 0x{0:02x}")]
    UnknownOpCode(u8),
    #[error("received packet with unknown request id {0}")]
    UnknownRequestId(u8),
    #[error("unexpected reply with op code 0x{0:02x}")]
    UnexpectedReply(u8),
    #[error("malformed packet: {0}")]
    Decode(#[from] ion_proto::DecodeError),
}

#[derive(Debug, thiserror::Error)]
pub enum DfuError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("firmware image is too large: {0} bytes")]
    ImageTooLarge(usize),
    #[error("scan ended without finding a device in DFU mode")]
    DeviceNotFound,
    #[error("could not find DFU service {0}")]
    ServiceNotFound(Uuid),
    #[error("could not find DFU characteristic {0}")]
    CharacteristicNotFound(Uuid),
    #[error("could not find CCCD on the DFU control point")]
    CccdNotFound,
    #[error("device rejected op {op}: {status}")]
    Rejected { op: u8, status: DfuStatus },
    #[error("lost connection to the device before activation")]
    ConnectionLost,
}

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("http error: {0}")]
    Http(String),
    #[error("weather service returned status {0}")]
    Status(u16),
    #[error("malformed weather response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("weather response is missing {0}")]
    Missing(&'static str),
    #[error("lamp did not accept weather: {0}")]
    Lamp(#[from] LampError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine home directory")]
    NoHome,
    #[error("failed to read {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("invalid json in {path}: {source}")]
    Json {
        path: std::path::PathBuf,
        source: serde_json::Error,
    },
    #[error("{0} is not configured")]
    Missing(&'static str),
}
