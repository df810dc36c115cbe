//! Shared building blocks for the experiment orchestrator and tunnel managers
//!
//! Holds what both processes need: process identity and logging, the
//! tunnel-manager line protocol, and the process supervision primitives.

// Lets the exported logging macros resolve `shared::` paths inside this crate too
extern crate self as shared;

pub mod errors;
pub mod logging;
pub mod protocol;
pub mod supervisor;
pub mod types;

pub use errors::*;
pub use protocol::{TunnelCommand, TunnelProgram, CONNECTED_MARKER, READY_LINE};
pub use supervisor::{kill_group, ManagedProcess, StdioPlan};
pub use types::*;
