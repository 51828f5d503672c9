use thiserror::Error;

/// Errors that can occur while capturing or persisting a session.
///
/// None of these are fatal to the process: a failed session is logged,
/// reported through the delegate, and a fresh session may be started.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("device not available: {0}")]
    DeviceNotAvailable(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("invalid wav data: {0}")]
    InvalidWav(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}
