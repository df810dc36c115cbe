//! The tunnel manager's reactive loop
//!
//! Reads one command per line, dispatches it, and repeats until `halt`, the
//! end of its input, or the shutdown future resolves. A `readline` does not
//! block the loop: it is answered when the tunnel prints, while later
//! commands keep being read. Every exit path kills the process group of
//! every tunnel it started.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::PathBuf;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use shared::{
    process_debug, process_error, process_info, process_warn, ManagedProcess, ProcessId, SharedResult, StdioPlan,
    TunnelCommand, TunnelProgram, READY_LINE,
};

use crate::error::{ManagerError, ManagerResult};
use crate::expand::expand_tunnel_args;

/// Explicit configuration handed to a manager at construction
#[derive(Debug, Clone, Default)]
pub struct ManagerContext {
    /// Directory holding `mm-tunnelclient` / `mm-tunnelserver`; `PATH` lookup when unset
    pub tool_dir: Option<PathBuf>,
}

impl ManagerContext {
    fn program_path(&self, program: TunnelProgram) -> String {
        match &self.tool_dir {
            Some(dir) => dir.join(program.binary()).to_string_lossy().into_owned(),
            None => program.binary().to_string(),
        }
    }
}

/// Outcome of dispatching one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Halt,
}

/// Why [`TunnelManager::serve`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// `halt` command received
    Halted,
    /// Command input reached end of file
    InputClosed,
    /// Shutdown future resolved (SIGINT / SIGTERM)
    Signalled,
}

enum Event {
    Shutdown,
    Reply(u32, SharedResult<String>),
    Input(std::io::Result<Option<String>>),
}

/// Owns the table of tunnel id -> child process
pub struct TunnelManager {
    context: ManagerContext,
    tunnels: HashMap<u32, ManagedProcess>,
    /// Tunnels with an outstanding `readline`, answered in request order
    pending: VecDeque<u32>,
    prompt: Option<String>,
}

impl TunnelManager {
    pub fn new(context: ManagerContext) -> Self {
        Self {
            context,
            tunnels: HashMap::new(),
            pending: VecDeque::new(),
            prompt: None,
        }
    }

    /// Number of tunnels currently registered
    pub fn tunnel_count(&self) -> usize {
        self.tunnels.len()
    }

    /// Ids with a `readline` still waiting for output, oldest first
    pub fn pending_reads(&self) -> impl Iterator<Item = u32> + '_ {
        self.pending.iter().copied()
    }

    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    /// Announce readiness on `output`, then execute commands read from
    /// `input` until halted, the input closes, or `shutdown` resolves.
    pub async fn serve<R, W, F>(&mut self, input: R, mut output: W, shutdown: F) -> ManagerResult<ExitReason>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        output.write_all(format!("{READY_LINE}\n").as_bytes()).await?;
        output.flush().await?;

        let mut lines = input.lines();
        loop {
            // Both reads are cancel safe: a partial line stays buffered.
            let event = tokio::select! {
                biased;
                _ = &mut shutdown => Event::Shutdown,
                (id, reply) = Self::next_reply(&mut self.tunnels, &self.pending) => Event::Reply(id, reply),
                line = lines.next_line() => Event::Input(line),
            };

            let step = match event {
                Event::Shutdown => {
                    process_warn!(ProcessId::current(), "caught shutdown signal, cleaning up tunnels");
                    self.kill_all();
                    return Ok(ExitReason::Signalled);
                }
                Event::Reply(id, reply) => {
                    self.pending.pop_front();
                    self.answer(id, reply, &mut output).await
                }
                Event::Input(Ok(Some(line))) => Ok(self.dispatch(&line).await),
                Event::Input(Ok(None)) => {
                    process_info!(ProcessId::current(), "command input closed, halting");
                    self.kill_all();
                    return Ok(ExitReason::InputClosed);
                }
                Event::Input(Err(e)) => Err(e.into()),
            };

            match step {
                Ok(Step::Continue) => {}
                Ok(Step::Halt) => return Ok(ExitReason::Halted),
                Err(e) => {
                    self.kill_all();
                    return Err(e);
                }
            }
        }
    }

    /// Next line of the oldest tunnel with a pending `readline`; never
    /// resolves while nothing is pending
    async fn next_reply(
        tunnels: &mut HashMap<u32, ManagedProcess>,
        pending: &VecDeque<u32>,
    ) -> (u32, SharedResult<String>) {
        let Some((id, tunnel)) = pending
            .front()
            .and_then(|&id| tunnels.get_mut(&id).map(|tunnel| (id, tunnel)))
        else {
            return std::future::pending().await;
        };
        (id, tunnel.read_line(None).await)
    }

    /// Write a tunnel's line as the reply to its `readline`. A tunnel that
    /// fails to produce one is logged; only failures of `output` are returned.
    async fn answer<W>(&mut self, id: u32, reply: SharedResult<String>, output: &mut W) -> ManagerResult<Step>
    where
        W: AsyncWrite + Unpin,
    {
        match reply {
            Ok(line) => {
                output.write_all(format!("{line}\n").as_bytes()).await?;
                output.flush().await?;
            }
            Err(e) => {
                process_error!(ProcessId::current(), "error: readline on tunnel {}: {}", id, e);
            }
        }
        Ok(Step::Continue)
    }

    /// Parse and execute one input line. Command failures are logged.
    async fn dispatch(&mut self, line: &str) -> Step {
        self.log_input(line);

        let command = match TunnelCommand::parse(line) {
            Ok(command) => command,
            Err(e) => {
                process_error!(ProcessId::current(), "error: {}", e);
                return Step::Continue;
            }
        };

        match self.execute(command).await {
            Ok(step) => step,
            Err(e) => {
                process_error!(ProcessId::current(), "error: {}", e);
                Step::Continue
            }
        }
    }

    /// Execute one parsed command.
    ///
    /// `readline` only queues a request; [`TunnelManager::serve`] writes the
    /// reply once the tunnel prints. Starting or stopping a tunnel drops any
    /// request still pending for it.
    pub async fn execute(&mut self, command: TunnelCommand) -> ManagerResult<Step> {
        match command {
            TunnelCommand::Start { id, program, args } => {
                self.cancel_reads(id);
                self.start_tunnel(id, program, &args)?;
            }
            TunnelCommand::Forward { id, line } => {
                let tunnel = self.tunnels.get_mut(&id).ok_or(ManagerError::UnknownTunnel { id })?;
                tunnel.write_line(&line).await?;
            }
            TunnelCommand::ReadLine { id } => {
                if !self.tunnels.contains_key(&id) {
                    return Err(ManagerError::UnknownTunnel { id });
                }
                self.pending.push_back(id);
            }
            TunnelCommand::Stop { id } => {
                self.cancel_reads(id);
                let mut tunnel = self.tunnels.remove(&id).ok_or(ManagerError::UnknownTunnel { id })?;
                tunnel.kill_group();
            }
            TunnelCommand::Prompt(text) => {
                self.prompt = Some(text);
            }
            TunnelCommand::Halt => {
                self.kill_all();
                return Ok(Step::Halt);
            }
        }
        Ok(Step::Continue)
    }

    fn cancel_reads(&mut self, id: u32) {
        let before = self.pending.len();
        self.pending.retain(|&pending| pending != id);
        if self.pending.len() < before {
            process_warn!(ProcessId::current(), "dropping unanswered readline on tunnel {}", id);
        }
    }

    fn start_tunnel(&mut self, id: u32, program: TunnelProgram, args: &[String]) -> ManagerResult<()> {
        if let Some(existing) = self.tunnels.get_mut(&id) {
            if existing.is_running() {
                return Err(ManagerError::DuplicateTunnel { id });
            }
            process_debug!(ProcessId::current(), "replacing exited tunnel {}", id);
        }

        let mut argv = vec![self.context.program_path(program)];
        argv.extend(expand_tunnel_args(args));

        let tunnel = ManagedProcess::start(&argv, StdioPlan::PIPED)?;
        self.tunnels.insert(id, tunnel);
        Ok(())
    }

    /// Kill every managed process group. Safe to call repeatedly.
    pub fn kill_all(&mut self) {
        self.pending.clear();
        for (id, mut tunnel) in self.tunnels.drain() {
            process_debug!(ProcessId::current(), "stopping tunnel {}", id);
            tunnel.kill_group();
        }
    }

    fn log_input(&self, line: &str) {
        match &self.prompt {
            Some(prompt) => {
                process_info!(ProcessId::current(), "{} {}", prompt, line);
            }
            None => {
                process_info!(ProcessId::current(), "{}", line);
            }
        }
    }
}

impl Drop for TunnelManager {
    fn drop(&mut self) {
        self.kill_all();
    }
}
