//! Common helpers for driving the tunnel-manager binary in tests

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use shared::{ManagedProcess, StdioPlan, READY_LINE};

pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Write an executable `/bin/sh` script named `name` into `dir`
pub fn write_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Start the manager binary with fake tools and wait for its announcement
pub async fn spawn_manager(tool_dir: &Path) -> ManagedProcess {
    let binary = env!("CARGO_BIN_EXE_tunnel-manager");
    let tool_dir = tool_dir.to_string_lossy().into_owned();
    let mut manager = ManagedProcess::start(
        &[binary, "--log-level", "debug", "--tool-dir", tool_dir.as_str()],
        StdioPlan::PIPED,
    )
    .unwrap();

    let first = manager.read_line(Some(REPLY_TIMEOUT)).await.unwrap();
    assert_eq!(first, READY_LINE);
    manager
}

/// Poll until `path` holds a pid
pub async fn read_pid_file(path: &Path) -> i32 {
    for _ in 0..100 {
        if let Ok(text) = std::fs::read_to_string(path) {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no pid written to {}", path.display());
}

/// Zombies count as gone; they only wait to be reaped
pub fn is_alive(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => !stat.contains(") Z "),
        Err(_) => false,
    }
}

/// Poll until `pid` is gone, within a bounded grace period
pub async fn wait_until_gone(pid: i32) -> bool {
    for _ in 0..100 {
        if !is_alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
