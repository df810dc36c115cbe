//! Process supervision primitives
//!
//! Every child is started as the leader of a fresh process group so that it
//! and anything it spawns can be torn down with one `killpg`. Dropping a
//! [`ManagedProcess`] signals its group; teardown happens on every exit path.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::errors::{SharedError, SharedResult};
use crate::{process_debug, process_info, process_warn, ProcessId};

/// Which standard streams of the child are captured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StdioPlan {
    pub stdin: bool,
    pub stdout: bool,
}

impl StdioPlan {
    /// Nothing captured: stdin closed, stdout shared with the parent
    pub const DETACHED: StdioPlan = StdioPlan {
        stdin: false,
        stdout: false,
    };

    /// Line channel in both directions
    pub const PIPED: StdioPlan = StdioPlan {
        stdin: true,
        stdout: true,
    };
}

/// Handle for a supervised child process group
pub struct ManagedProcess {
    command: String,
    child: Child,
    pgid: Option<Pid>,
    stdin: Option<ChildStdin>,
    stdout: Option<Lines<BufReader<ChildStdout>>>,
    signalled: bool,
}

impl ManagedProcess {
    /// Spawn `argv` in a new process group
    pub fn start<S: AsRef<str>>(argv: &[S], plan: StdioPlan) -> SharedResult<Self> {
        let command = argv.iter().map(|a| a.as_ref()).collect::<Vec<_>>().join(" ");
        let Some((program, args)) = argv.split_first() else {
            return Err(SharedError::Spawn {
                command,
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command line"),
            });
        };

        process_info!(ProcessId::current(), "$ {}", command.trim());

        let mut cmd = Command::new(program.as_ref());
        cmd.args(args.iter().map(|a| a.as_ref()))
            .process_group(0)
            .stdin(if plan.stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(if plan.stdout { Stdio::piped() } else { Stdio::inherit() })
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|source| SharedError::Spawn {
            command: command.clone(),
            source,
        })?;

        let pgid = child.id().map(|pid| Pid::from_raw(pid as i32));
        let stdin = child.stdin.take();
        let stdout = child.stdout.take().map(|out| BufReader::new(out).lines());

        Ok(Self {
            command,
            child,
            pgid,
            stdin,
            stdout,
            signalled: false,
        })
    }

    /// Spawn a `/bin/sh -c` script in a new process group
    pub fn start_shell(script: &str, plan: StdioPlan) -> SharedResult<Self> {
        Self::start(&["sh", "-c", script], plan)
    }

    /// Command line the process was started with
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn id(&self) -> Option<u32> {
        self.pgid.map(|pid| pid.as_raw() as u32)
    }

    /// Write `text` as one newline-terminated line to the child's stdin
    pub async fn write_line(&mut self, text: &str) -> SharedResult<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(SharedError::protocol(format!("stdin of `{}` is not captured", self.command)));
        };

        let mut line = text.trim_end_matches(['\n', '\r']).to_string();
        line.push('\n');

        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        };
        written.await.map_err(|e| match e.kind() {
            std::io::ErrorKind::BrokenPipe => SharedError::BrokenPipe {
                command: self.command.clone(),
            },
            _ => SharedError::Io(e),
        })
    }

    /// Read one line from the child's stdout, waiting at most `timeout`.
    ///
    /// A line that is not complete when the deadline passes stays buffered
    /// for the next call.
    pub async fn read_line(&mut self, timeout: Option<Duration>) -> SharedResult<String> {
        let Some(lines) = self.stdout.as_mut() else {
            return Err(SharedError::protocol(format!("stdout of `{}` is not captured", self.command)));
        };

        let next = match timeout {
            Some(limit) => tokio::time::timeout(limit, lines.next_line())
                .await
                .map_err(|_| SharedError::Timeout { timeout: limit })?,
            None => lines.next_line().await,
        };

        match next {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(SharedError::Eof {
                command: self.command.clone(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Err(SharedError::Eof {
                command: self.command.clone(),
            }),
            Err(e) => Err(SharedError::Io(e)),
        }
    }

    /// Whether the group leader has not exited yet
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Wait for the group leader to exit
    pub async fn wait(&mut self) -> SharedResult<ExitStatus> {
        Ok(self.child.wait().await?)
    }

    /// Send SIGTERM to the whole process group
    pub fn kill_group(&mut self) {
        self.signal_group(Signal::SIGTERM);
    }

    /// Send `signal` to the whole process group. Only the first call
    /// signals; a group that is already gone is logged, not escalated.
    pub fn signal_group(&mut self, signal: Signal) {
        if self.signalled {
            return;
        }
        self.signalled = true;

        let Some(pgid) = self.pgid else {
            return;
        };

        match killpg(pgid, signal) {
            Ok(()) => {
                process_debug!(
                    ProcessId::current(),
                    "kill_group: sent {} to process group {} (`{}`)",
                    signal,
                    pgid,
                    self.command
                );
            }
            Err(Errno::ESRCH) => {
                process_warn!(
                    ProcessId::current(),
                    "kill_group: process group {} already exited (`{}`)",
                    pgid,
                    self.command
                );
            }
            Err(e) => {
                process_warn!(
                    ProcessId::current(),
                    "kill_group: failed to kill process group {}: {}",
                    pgid,
                    e
                );
            }
        }
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        self.kill_group();
    }
}

/// Kill the group behind an optional handle; absent handles are a no-op
pub fn kill_group(process: Option<&mut ManagedProcess>) {
    if let Some(process) = process {
        process.kill_group();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    /// Zombies waiting for init to reap them count as gone
    fn is_alive(pid: Pid) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => !stat.contains(") Z "),
            Err(_) => false,
        }
    }

    #[tokio::test]
    async fn test_line_round_trip_through_child() {
        let mut child = ManagedProcess::start_shell("read l; echo \"got:$l\"", StdioPlan::PIPED).unwrap();

        child.write_line("hello").await.unwrap();
        let line = child.read_line(Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(line, "got:hello");
    }

    #[tokio::test]
    async fn test_read_line_times_out() {
        let mut child = ManagedProcess::start(&["sleep", "5"], StdioPlan::PIPED).unwrap();

        let err = child.read_line(Some(Duration::from_millis(100))).await.unwrap_err();
        assert!(err.is_timeout());
        child.kill_group();
    }

    #[tokio::test]
    async fn test_read_line_reports_eof() {
        let mut child = ManagedProcess::start(&["true"], StdioPlan::PIPED).unwrap();

        let err = child.read_line(Some(Duration::from_secs(5))).await.unwrap_err();
        assert!(matches!(err, SharedError::Eof { .. }));
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_error() {
        let err = ManagedProcess::start(&["/definitely/not/here"], StdioPlan::DETACHED)
            .err()
            .unwrap();
        assert!(matches!(err, SharedError::Spawn { .. }));

        let empty: [&str; 0] = [];
        assert!(matches!(
            ManagedProcess::start(&empty, StdioPlan::DETACHED),
            Err(SharedError::Spawn { .. })
        ));
    }

    #[tokio::test]
    async fn test_kill_group_is_idempotent() {
        let mut child = ManagedProcess::start(&["sleep", "30"], StdioPlan::DETACHED).unwrap();

        child.kill_group();
        child.kill_group();

        let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.signal(), Some(Signal::SIGTERM as i32));
    }

    #[tokio::test]
    async fn test_kill_group_after_exit_is_swallowed() {
        let mut child = ManagedProcess::start(&["true"], StdioPlan::DETACHED).unwrap();
        child.wait().await.unwrap();

        child.kill_group();
        kill_group(None);
        assert!(!child.is_running());
    }

    #[tokio::test]
    async fn test_kill_group_reaches_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("grandchild.pid");
        let script = format!("sleep 30 & echo $! > {}; wait", marker.display());
        let mut child = ManagedProcess::start_shell(&script, StdioPlan::DETACHED).unwrap();

        let mut grandchild = None;
        for _ in 0..50 {
            if let Ok(text) = std::fs::read_to_string(&marker) {
                if let Ok(pid) = text.trim().parse::<i32>() {
                    grandchild = Some(Pid::from_raw(pid));
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let grandchild = grandchild.expect("grandchild pid written");

        child.kill_group();
        child.wait().await.unwrap();

        let mut gone = false;
        for _ in 0..50 {
            if !is_alive(grandchild) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(gone, "grandchild {grandchild} survived the group kill");
    }
}
