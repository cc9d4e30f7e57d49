//! DFU control point protocol - op codes, status codes and response parsing

pub const OP_START_DFU: u8 = 1;
pub const OP_INITIALIZE_DFU: u8 = 2;
pub const OP_RECEIVE_FIRMWARE_IMAGE: u8 = 3;
pub const OP_VALIDATE_FIRMWARE_IMAGE: u8 = 4;
pub const OP_ACTIVATE_AND_RESET: u8 = 5;

/// First byte of every control point notification
pub const RESPONSE_CODE: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DfuStatus {
    Success,
    InvalidState,
    NotSupported,
    DataSizeExceedsLimits,
    CrcError,
    OperationFailed,
    Unknown(u8),
}

impl DfuStatus {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Success,
            2 => Self::InvalidState,
            3 => Self::NotSupported,
            4 => Self::DataSizeExceedsLimits,
            5 => Self::CrcError,
            6 => Self::OperationFailed,
            other => Self::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Success => 1,
            Self::InvalidState => 2,
            Self::NotSupported => 3,
            Self::DataSizeExceedsLimits => 4,
            Self::CrcError => 5,
            Self::OperationFailed => 6,
            Self::Unknown(code) => *code,
        }
    }
}

impl std::fmt::Display for DfuStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "unknown status {code}"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Notification on the control point: `[RESPONSE_CODE, request_op, status]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlResponse {
    pub request_op: u8,
    pub status: DfuStatus,
}

impl ControlResponse {
    /// Anything that is not exactly three bytes is not a response
    pub fn parse(data: &[u8]) -> Option<Self> {
        match data {
            [_, request_op, status] => Some(Self {
                request_op: *request_op,
                status: DfuStatus::from_code(*status),
            }),
            _ => None,
        }
    }

    pub fn to_bytes(&self) -> [u8; 3] {
        [RESPONSE_CODE, self.request_op, self.status.code()]
    }
}

/// Image length as written to the packet characteristic after START_DFU
pub fn image_size_packet(len: u32) -> [u8; 4] {
    len.to_le_bytes()
}
