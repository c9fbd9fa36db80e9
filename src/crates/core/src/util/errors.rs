//! Error types shared across the service and agentic layers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvError {
    /// Transport or handshake failure while opening the tool session.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transport drop, timeout or protocol error during a tool call.
    #[error("Invocation error: {0}")]
    Invocation(String),

    #[error("Tool server response is empty or does not contain 'text' content")]
    EmptyResponse,

    #[error("Failed to parse server response ({reason}). Content was: '{text}'")]
    MalformedResponse { text: String, reason: String },

    #[error("Render mode {0} is not implemented")]
    UnsupportedMode(String),

    #[error("Async bridge error: {0}")]
    Bridge(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// An episode could not be started.
    #[error("Failed to reset the environment: {0}")]
    ResetFailed(#[source] Box<EnvError>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EnvResult<T> = Result<T, EnvError>;

impl EnvError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn invocation(msg: impl Into<String>) -> Self {
        Self::Invocation(msg.into())
    }

    pub fn bridge(msg: impl Into<String>) -> Self {
        Self::Bridge(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn malformed(text: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedResponse {
            text: text.into(),
            reason: reason.to_string(),
        }
    }

    /// Network-side failures that a running episode turns into a truncation.
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::Invocation(_)
                | Self::EmptyResponse
                | Self::MalformedResponse { .. }
        )
    }
}
