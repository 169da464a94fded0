//! Error types for the application protocol stack

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, AppConnError>;

/// Top-level connection stack error
#[derive(Debug, Error)]
pub enum AppConnError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("register request connId {conn_id} connIndex {conn_index} rejected")]
    RegistrationRejected { conn_id: u32, conn_index: u8 },

    #[error("connection offline")]
    NotConnected,

    #[error("configuration error: {0}")]
    Config(String),
}

/// Wire codec errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer too short")]
    BufferTooShort,

    #[error("TLV value length {0} exceeds 255")]
    PayloadTooLong(usize),

    #[error("unknown basic type: 0x{0:02x}")]
    UnknownBasicType(u8),

    #[error("invalid value length {len} for type 0x{ty:02x}")]
    InvalidLength { ty: u8, len: usize },

    #[error("invalid BCD digit")]
    InvalidBcd,

    #[error("unsupported protocol version 0x{0:02x}")]
    VersionNotSupported(u8),
}
