//! Tunnel-manager error types

use shared::SharedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("tunnel {id} is already running; halt it before starting another")]
    DuplicateTunnel { id: u32 },

    #[error("no tunnel registered under id {id}; run tunnel client or server first")]
    UnknownTunnel { id: u32 },

    #[error(transparent)]
    Shared(#[from] SharedError),

    #[error("I/O error on command channel: {0}")]
    Io(#[from] std::io::Error),
}

pub type ManagerResult<T> = Result<T, ManagerError>;
