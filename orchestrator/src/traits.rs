//! Trait definitions with mockall annotations for testing
//!
//! The seams between the Test state machine and the outside world: a scheme
//! executable and a tunnel manager's command channel. Real implementations
//! live in `services`.

use shared::{Side, TunnelCommand};
use std::process::ExitStatus;
use std::time::Duration;

use crate::error::OrchestratorResult;

/// Capability interface of one congestion-control scheme
///
/// New schemes are added by registering an executable path with the
/// `SchemeRegistry`; every implementation speaks the same small contract.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Scheme: Send + Sync {
    /// Scheme name as used in log and file names
    fn name(&self) -> String;

    /// OS packages the scheme needs
    async fn deps(&self) -> OrchestratorResult<Vec<String>>;

    /// One-time host preparation
    async fn setup(&self) -> OrchestratorResult<()>;

    /// Which side must be listening before the other connects
    async fn run_first(&self) -> OrchestratorResult<Side>;

    /// Run the receiving side to completion
    async fn receiver(&self, args: Vec<String>) -> OrchestratorResult<ExitStatus>;

    /// Run the sending side to completion
    async fn sender(&self, args: Vec<String>) -> OrchestratorResult<ExitStatus>;
}

/// Typed client over a tunnel manager's line channel
///
/// `send` is fire-and-forget; only `readline` commands are answered, and the
/// answer is collected with `read_reply`.
#[mockall::automock]
#[async_trait::async_trait]
pub trait ManagerLink: Send {
    /// Label used in diagnostics (`tsm` / `tcm`)
    fn label(&self) -> String;

    /// Write one command line to the manager
    async fn send(&mut self, command: &TunnelCommand) -> OrchestratorResult<()>;

    /// Read one reply line, waiting at most `timeout`
    async fn read_reply(&mut self, timeout: Option<Duration>) -> OrchestratorResult<String>;

    /// Send `halt` and give the manager up to `grace` to exit on its own
    async fn halt(&mut self, grace: Duration) -> OrchestratorResult<()>;

    /// Kill the manager's process group
    fn terminate(&mut self);
}
