//! Orchestrator library for congestion-control experiments
//!
//! Drives schemes through emulated or cross-host tunnels: one Test per
//! (scheme, run id) pair, each owning its tunnel managers, scheme processes
//! and logs from setup until teardown.

pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod experiment;
pub mod scheme;
pub mod services;
pub mod traits;

// Re-export commonly used types
pub use config::{LinkConfig, MultiFlowConfig, RemoteConfig, RunConfig};
pub use context::{ExperimentContext, RemoteHost};
pub use error::{OrchestratorError, OrchestratorResult};
pub use experiment::{setup_schemes, Experiment, ExperimentReport};
pub use scheme::{Flow, SchemeRegistry};
pub use scheme_test::{RunOutcome, RunReport, SchemeTest, Timing};
pub use traits::{ManagerLink, Scheme};
