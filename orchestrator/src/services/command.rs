//! Short-lived helper commands (scheme queries, ssh, scp, ntpdate)

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{OrchestratorError, OrchestratorResult};
use shared::{process_debug, process_info, ProcessId, SharedError};

fn command_line<S: AsRef<str>>(argv: &[S]) -> String {
    argv.iter().map(|a| a.as_ref()).collect::<Vec<_>>().join(" ")
}

fn build<S: AsRef<str>>(argv: &[S]) -> OrchestratorResult<(String, Command)> {
    let line = command_line(argv);
    let Some((program, args)) = argv.split_first() else {
        return Err(OrchestratorError::Shared(SharedError::Spawn {
            command: line,
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command line"),
        }));
    };
    process_info!(ProcessId::current(), "$ {}", line);

    let mut cmd = Command::new(program.as_ref());
    cmd.args(args.iter().map(|a| a.as_ref())).kill_on_drop(true);
    Ok((line, cmd))
}

fn spawn_error(command: &str, source: std::io::Error) -> OrchestratorError {
    OrchestratorError::Shared(SharedError::Spawn {
        command: command.to_string(),
        source,
    })
}

/// Run `argv` and return its stdout; a non-zero exit is an error
pub async fn check_output<S: AsRef<str>>(argv: &[S]) -> OrchestratorResult<String> {
    let (line, mut cmd) = build(argv)?;
    let output = cmd
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .output()
        .await
        .map_err(|e| spawn_error(&line, e))?;

    if !output.status.success() {
        return Err(OrchestratorError::Command {
            command: line,
            status: output.status.to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run `argv` with inherited output and return its exit status
pub async fn call<S: AsRef<str>>(argv: &[S]) -> OrchestratorResult<ExitStatus> {
    let (line, mut cmd) = build(argv)?;
    let status = cmd
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|e| spawn_error(&line, e))?;
    process_debug!(ProcessId::current(), "`{}` exited with {}", line, status);
    Ok(status)
}

/// Like [`call`], but a non-zero exit is an error
pub async fn check_call<S: AsRef<str>>(argv: &[S]) -> OrchestratorResult<()> {
    let status = call(argv).await?;
    if status.success() {
        Ok(())
    } else {
        Err(OrchestratorError::Command {
            command: command_line(argv),
            status: status.to_string(),
        })
    }
}

/// Feed `script` to `argv` on stdin (e.g. `sh -s`) and capture stdout.
///
/// Returns the exit status alongside the output; callers decide whether a
/// failure matters.
pub async fn run_script<S: AsRef<str>>(
    argv: &[S],
    script: &str,
    cwd: Option<&Path>,
) -> OrchestratorResult<(ExitStatus, String)> {
    let (line, mut cmd) = build(argv)?;
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| spawn_error(&line, e))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(script.as_bytes()).await?;
        stdin.shutdown().await?;
    }

    let output = child.wait_with_output().await?;
    Ok((output.status, String::from_utf8_lossy(&output.stdout).into_owned()))
}
