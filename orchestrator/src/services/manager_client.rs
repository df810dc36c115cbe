//! Client side of the tunnel-manager line protocol
//!
//! Spawns a tunnel manager (locally, over ssh, or inside the emulated link)
//! as a supervised child and talks to it through its stdin/stdout.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::ManagerLink;
use shared::{
    process_debug, process_info, process_warn, ManagedProcess, ProcessId, SharedError, StdioPlan,
    TunnelCommand, READY_LINE,
};

/// How long a freshly started manager may take to announce itself
pub const MANAGER_READY_TIMEOUT: Duration = Duration::from_secs(60);

pub struct TunnelManagerClient {
    label: String,
    process: ManagedProcess,
}

impl TunnelManagerClient {
    /// Start the manager command line in its own process group
    pub fn spawn(label: impl Into<String>, argv: &[String]) -> OrchestratorResult<Self> {
        let process = ManagedProcess::start(argv, StdioPlan::PIPED)?;
        Ok(Self {
            label: label.into(),
            process,
        })
    }

    /// Start a manager, wait for its ready line and label its log output
    pub async fn launch(label: &str, argv: &[String], ready_timeout: Duration) -> OrchestratorResult<Self> {
        let mut client = Self::spawn(label, argv)?;
        client.wait_until_ready(ready_timeout).await?;
        client.send(&TunnelCommand::Prompt(format!("[{label}]"))).await?;
        Ok(client)
    }

    /// Consume output until the ready line; anything printed before it
    /// (login banners, link setup chatter) is skipped
    pub async fn wait_until_ready(&mut self, timeout: Duration) -> OrchestratorResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SharedError::Timeout { timeout }.into());
            }
            let line = self.process.read_line(Some(remaining)).await.map_err(|e| match e {
                SharedError::Timeout { .. } => SharedError::Timeout { timeout },
                other => other,
            })?;
            if line.contains(READY_LINE) {
                process_info!(ProcessId::current(), "[{}] {}", self.label, READY_LINE);
                return Ok(());
            }
            process_debug!(ProcessId::current(), "[{}] before ready: {}", self.label, line);
        }
    }
}

#[async_trait]
impl ManagerLink for TunnelManagerClient {
    fn label(&self) -> String {
        self.label.clone()
    }

    async fn send(&mut self, command: &TunnelCommand) -> OrchestratorResult<()> {
        process_debug!(ProcessId::current(), "[{}] <- {}", self.label, command);
        self.process.write_line(&command.to_string()).await?;
        Ok(())
    }

    async fn read_reply(&mut self, timeout: Option<Duration>) -> OrchestratorResult<String> {
        let line = self.process.read_line(timeout).await?;
        process_debug!(ProcessId::current(), "[{}] -> {}", self.label, line);
        Ok(line.trim_end().to_string())
    }

    async fn halt(&mut self, grace: Duration) -> OrchestratorResult<()> {
        match self.send(&TunnelCommand::Halt).await {
            Ok(()) => {}
            // Already gone; nothing left to halt
            Err(OrchestratorError::Shared(SharedError::BrokenPipe { .. })) => return Ok(()),
            Err(e) => return Err(e),
        }

        match tokio::time::timeout(grace, self.process.wait()).await {
            Ok(status) => {
                process_debug!(ProcessId::current(), "[{}] exited: {:?}", self.label, status.ok());
            }
            Err(_) => {
                process_warn!(
                    ProcessId::current(),
                    "[{}] did not exit within {:?} of halt",
                    self.label,
                    grace
                );
            }
        }
        Ok(())
    }

    fn terminate(&mut self) {
        self.process.kill_group();
    }
}
