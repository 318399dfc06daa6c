use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("unsupported sentence: {0}")]
    UnsupportedSentence(String),
    #[error("checksum mismatch: expected {expected:02X}, computed {computed:02X}")]
    Checksum { expected: u8, computed: u8 },
}
