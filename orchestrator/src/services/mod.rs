//! Service implementations
//!
//! Real implementations of the orchestrator's seams and the helpers that
//! touch processes, hosts and clocks.

pub mod clock;
pub mod command;
pub mod executable_scheme;
pub mod manager_client;
pub mod remote;

pub use clock::{ClockOffsets, LinkOffsets};
pub use executable_scheme::ExecutableScheme;
pub use manager_client::{TunnelManagerClient, MANAGER_READY_TIMEOUT};
