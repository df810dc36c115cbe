//! Tunnel establishment over manager links
//!
//! The server-side manager starts `mm-tunnelserver` and hands back the exact
//! client command line; the client-side manager starts `mm-tunnelclient`
//! and is polled with `readline` until the client reports a connection.

use std::time::Duration;
use tokio::time::Instant;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::ManagerLink;
use shared::{
    process_debug, process_info, process_warn, ProcessId, TunnelCommand, TunnelProgram, CONNECTED_MARKER,
};

/// Bounded retries for connecting a tunnel client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            attempt_timeout: Duration::from_secs(20),
        }
    }
}

/// Client command line printed by a tunnel server:
/// `mm-tunnelclient <destination> <port> <client_ip> <server_ip> [args...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInvocation {
    tokens: Vec<String>,
}

impl ClientInvocation {
    pub fn parse(line: &str) -> OrchestratorResult<Self> {
        let tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if tokens.len() < 5 || tokens[0] != TunnelProgram::Client.binary() {
            return Err(shared::SharedError::protocol(format!("unexpected tunnel server reply: {line:?}")).into());
        }
        Ok(Self { tokens })
    }

    pub fn client_ip(&self) -> &str {
        &self.tokens[3]
    }

    pub fn server_ip(&self) -> &str {
        &self.tokens[4]
    }

    /// Start command for the client, connecting to `destination` and
    /// carrying `extra` arguments (log paths, interface)
    pub fn start_command(&self, id: u32, destination: &str, extra: Vec<String>) -> TunnelCommand {
        let mut args = self.tokens[1..].to_vec();
        args[0] = destination.to_string();
        args.extend(extra);
        TunnelCommand::Start {
            id,
            program: TunnelProgram::Client,
            args,
        }
    }
}

/// Abort when staggered flow starts cannot fit in the runtime.
/// The boundary is inclusive: `(flows - 1) * interval == runtime` is fine.
pub fn check_stagger(flows: u32, interval: Duration, runtime: Duration) -> OrchestratorResult<()> {
    let stagger = interval.saturating_mul(flows.saturating_sub(1));
    if stagger > runtime {
        return Err(OrchestratorError::StaggerOverrun {
            flows,
            interval,
            runtime,
        });
    }
    Ok(())
}

/// Start a tunnel server under `id` and return the client invocation it prints
pub async fn start_tunnel_server(
    link: &mut dyn ManagerLink,
    id: u32,
    args: Vec<String>,
    reply_timeout: Duration,
) -> OrchestratorResult<ClientInvocation> {
    link.send(&TunnelCommand::Start {
        id,
        program: TunnelProgram::Server,
        args,
    })
    .await?;
    link.send(&TunnelCommand::ReadLine { id }).await?;
    let reply = link.read_reply(Some(reply_timeout)).await?;
    ClientInvocation::parse(&reply)
}

/// Start the tunnel client and wait for it to connect.
///
/// Every attempt owns one deadline; replies are awaited with the time left
/// and a reply that arrives after the deadline is discarded. A retry first
/// stops the previous client so the id can be registered again.
pub async fn connect_tunnel_client(
    link: &mut dyn ManagerLink,
    id: u32,
    start: &TunnelCommand,
    policy: RetryPolicy,
) -> OrchestratorResult<()> {
    let label = link.label();

    for attempt in 1..=policy.attempts {
        if attempt > 1 {
            link.send(&TunnelCommand::Stop { id }).await?;
        }
        link.send(start).await?;

        let deadline = Instant::now() + policy.attempt_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            link.send(&TunnelCommand::ReadLine { id }).await?;
            match link.read_reply(Some(remaining)).await {
                Ok(line) if Instant::now() >= deadline => {
                    process_debug!(ProcessId::current(), "[{}] late reply discarded: {}", label, line);
                    break;
                }
                Ok(line) if line.contains(CONNECTED_MARKER) => {
                    process_info!(ProcessId::current(), "[{}] tunnel {} is connected", label, id);
                    return Ok(());
                }
                Ok(line) => {
                    process_debug!(ProcessId::current(), "[{}] tunnel {}: {}", label, id, line);
                }
                Err(e) if e.is_timeout() => break,
                Err(e) => return Err(e),
            }
        }

        process_warn!(
            ProcessId::current(),
            "[{}] tunnel {} connection timeout (attempt {}/{})",
            label,
            id,
            attempt,
            policy.attempts
        );
    }

    Err(OrchestratorError::ConnectionTimeout {
        tunnel_id: id,
        attempts: policy.attempts,
    })
}
