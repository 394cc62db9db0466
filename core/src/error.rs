use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcousticIpError {
    #[error("payload length {0} is outside 1..=MAX_FRAME_PAYLOAD")]
    InvalidPayloadLength(usize),

    #[error("frame length field is zero or exceeds MAX_FRAME_PAYLOAD")]
    InvalidLengthField,

    #[error("frame is shorter than its length field promises")]
    TruncatedFrame,

    #[error("CRC mismatch in frame")]
    CrcMismatch,

    #[error("device failed to open: {0}")]
    DeviceOpen(String),
}

pub type Result<T> = std::result::Result<T, AcousticIpError>;
