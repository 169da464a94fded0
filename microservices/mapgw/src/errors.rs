//! Error types for the gateway service

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Top-level gateway error
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("appconn error: {0}")]
    AppConn(#[from] sgw_appconn::AppConnError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Signalling transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("dialog allocation failed: {0}")]
    OpenFailed(String),

    #[error("send failed on dialog {dialog_id}: {reason}")]
    SendFailed { dialog_id: u32, reason: String },

    #[error("transport detached")]
    Detached,
}
