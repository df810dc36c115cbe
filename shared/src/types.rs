//! Core shared types and identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::errors::SharedError;

static PROCESS_ID: OnceLock<ProcessId> = OnceLock::new();
static UNSET_PROCESS_ID: ProcessId = ProcessId::Orchestrator;

/// Process identifier for any component in the system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessId {
    /// Experiment orchestrator (singleton per host)
    Orchestrator,
    /// Tunnel manager, labelled with its prompt once one is set
    TunnelManager,
}

impl ProcessId {
    /// Initialize the global process ID for orchestrator
    pub fn init_orchestrator() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Orchestrator)
    }

    /// Initialize the global process ID for a tunnel manager
    pub fn init_tunnel_manager() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::TunnelManager)
    }

    /// Get the global process ID.
    ///
    /// Library code running without an initialized identity (unit tests)
    /// logs as the orchestrator.
    pub fn current() -> &'static ProcessId {
        PROCESS_ID.get().unwrap_or(&UNSET_PROCESS_ID)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessId::Orchestrator => write!(f, "orchestrator"),
            ProcessId::TunnelManager => write!(f, "tunnel_manager"),
        }
    }
}

/// Endpoint role of a scheme process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Sender,
    Receiver,
}

impl Side {
    /// The role that is not `self`
    pub fn opposite(self) -> Side {
        match self {
            Side::Sender => Side::Receiver,
            Side::Receiver => Side::Sender,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Sender => "sender",
            Side::Receiver => "receiver",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "sender" => Ok(Side::Sender),
            "receiver" => Ok(Side::Receiver),
            other => Err(SharedError::Protocol {
                message: format!("must specify \"receiver\" or \"sender\" runs first, got {other:?}"),
            }),
        }
    }
}

/// Whether both endpoints share this host (behind an emulated link) or
/// one of them is reached over ssh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Local,
    Remote,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Local => write!(f, "local"),
            Mode::Remote => write!(f, "remote"),
        }
    }
}

/// Host on which a component runs, relative to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostSide {
    Local,
    Remote,
}

impl HostSide {
    pub fn opposite(self) -> HostSide {
        match self {
            HostSide::Local => HostSide::Remote,
            HostSide::Remote => HostSide::Local,
        }
    }
}

impl fmt::Display for HostSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostSide::Local => write!(f, "local"),
            HostSide::Remote => write!(f, "remote"),
        }
    }
}

impl FromStr for HostSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(HostSide::Local),
            "remote" => Ok(HostSide::Remote),
            other => Err(format!("unknown host side: {other}")),
        }
    }
}
