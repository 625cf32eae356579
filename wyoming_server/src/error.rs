use thiserror::Error;

use crate::protocol::{Event, ProtocolError};

/// Server error types
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Synthesis failed: {0:#}")]
    Synthesis(anyhow::Error),

    #[error("Synthesis task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Errors that only affect the current request. The connection stays
    /// open and the client is told with an `error` event.
    pub fn is_request_scoped(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_) | ServerError::Synthesis(_) | ServerError::Join(_)
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServerError::Config(_) => "config",
            ServerError::Protocol(_) => "protocol",
            ServerError::InvalidRequest(_) => "invalid-request",
            ServerError::Synthesis(_) | ServerError::Join(_) => "synthesis-failed",
            ServerError::Io(_) => "io",
        }
    }

    /// The `error` event reported to the client.
    pub fn to_event(&self) -> Event {
        Event::error(self.to_string(), self.code())
    }
}
