//! Error types for focusd

use thiserror::Error;

/// Core error type for focusd operations
#[derive(Debug, Error)]
pub enum FocusError {
    #[error("Session service stopped")]
    ServiceStopped,

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FocusError {
    pub fn invalid_command(msg: impl Into<String>) -> Self {
        Self::InvalidCommand(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, FocusError>;
