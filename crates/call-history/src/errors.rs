//! Error types for the call-history library
//!
//! None of these errors ever reach the signaling path. The transaction
//! recorder converts every failure into a "no fragment" decision or a
//! counter increment, and always forwards the message it was handed.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CallHistoryError {
    #[error("Missing header: {0}")]
    MissingHeader(&'static str),

    #[error("Invalid {header} header value: {value}")]
    InvalidHeader { header: &'static str, value: String },

    #[error("Invalid dialog token: {0}")]
    InvalidDialogToken(String),

    #[error("Failed to build call fragment XML: {0}")]
    XmlError(String),

    #[error("Call list store error: {0}")]
    StoreError(String),

    #[error("Call list notification failed: {0}")]
    NotifyError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Call list store processor queue is full")]
    QueueFull,

    #[error("Call list store processor has shut down")]
    ProcessorShutdown,
}

pub type Result<T> = std::result::Result<T, CallHistoryError>;

impl From<reqwest::Error> for CallHistoryError {
    fn from(err: reqwest::Error) -> Self {
        CallHistoryError::NotifyError(err.to_string())
    }
}
