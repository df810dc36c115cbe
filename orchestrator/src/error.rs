//! Orchestrator-specific error types

use shared::SharedError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Shared component error: {0}")]
    Shared(#[from] SharedError),

    #[error("Tunnel {tunnel_id} did not connect after {attempts} attempts")]
    ConnectionTimeout { tunnel_id: u32, attempts: u32 },

    #[error("Staggering {flows} flows by {interval:?} exceeds the runtime of {runtime:?}")]
    StaggerOverrun {
        flows: u32,
        interval: Duration,
        runtime: Duration,
    },

    #[error("Repository differs between local and remote sides\nlocal:\n{local}\nremote:\n{remote}")]
    RemoteDivergence { local: String, remote: String },

    #[error("Scheme {scheme}: {message}")]
    Scheme { scheme: String, message: String },

    #[error("Configuration error: {field}")]
    Configuration { field: String },

    #[error("Command `{command}` failed: {status}")]
    Command { command: String, status: String },

    #[error("Log merge failed: {message}")]
    LogMerge { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OrchestratorError {
    pub fn config(field: impl Into<String>) -> Self {
        OrchestratorError::Configuration { field: field.into() }
    }

    pub fn scheme(scheme: impl Into<String>, message: impl Into<String>) -> Self {
        OrchestratorError::Scheme {
            scheme: scheme.into(),
            message: message.into(),
        }
    }

    pub fn merge(message: impl Into<String>) -> Self {
        OrchestratorError::LogMerge { message: message.into() }
    }

    /// A per-read deadline expired; the peer may still answer later
    pub fn is_timeout(&self) -> bool {
        matches!(self, OrchestratorError::Shared(e) if e.is_timeout())
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
