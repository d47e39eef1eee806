//! Error type shared by every platform seam.
//!
//! Public controller and delivery operations never return these directly;
//! they convert them into outcome values at the boundary and log them.

use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PushError {
    #[error("Service workers are not supported on this platform")]
    Unsupported,

    #[error("Worker registration failed: {0}")]
    Registration(String),

    #[error("Invalid VAPID public key: {0}")]
    InvalidKey(String),

    #[error("Push subscription operation failed: {0}")]
    Subscription(String),

    #[error("Permission prompt failed: {0}")]
    Permission(String),

    #[error("Notification operation failed: {0}")]
    Notification(String),

    #[error("Client enumeration or messaging failed: {0}")]
    Clients(String),

    #[error("Window operation failed: {0}")]
    Window(String),

    #[error("Malformed push payload: {0}")]
    MalformedPayload(String),

    #[error("Message encoding failed: {0}")]
    Encoding(String),
}

impl From<serde_json::Error> for PushError {
    fn from(err: serde_json::Error) -> Self {
        PushError::Encoding(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PushError>;
