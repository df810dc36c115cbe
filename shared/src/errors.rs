//! Shared error types for tunnel control and process supervision

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Broken pipe writing to `{command}`")]
    BrokenPipe { command: String },

    #[error("Timed out after {timeout:?} waiting for a line")]
    Timeout { timeout: Duration },

    #[error("End of output from `{command}`")]
    Eof { command: String },

    #[error("Message protocol error: {message}")]
    Protocol { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SharedError {
    pub fn protocol(message: impl Into<String>) -> Self {
        SharedError::Protocol { message: message.into() }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SharedError::Timeout { .. })
    }
}

pub type SharedResult<T> = Result<T, SharedError>;
