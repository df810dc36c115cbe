//! Tunnel manager: multiplexes tunnel endpoint processes behind one
//! line-based command channel
//!
//! The orchestrator starts one manager per tunnel side and drives it through
//! its standard input; see [`shared::protocol`] for the command language.

pub mod error;
pub mod expand;
pub mod manager;

pub use error::{ManagerError, ManagerResult};
pub use manager::{ExitReason, ManagerContext, Step, TunnelManager};
