//! Polling helpers for processes started by fake tools

use std::path::Path;
use std::time::Duration;

/// Pids recorded one per line in `path`
pub fn read_pids(path: &Path) -> Vec<i32> {
    std::fs::read_to_string(path)
        .map(|text| text.lines().filter_map(|l| l.trim().parse().ok()).collect())
        .unwrap_or_default()
}

/// Poll until `path` holds at least `count` pids
pub async fn wait_for_pids(path: &Path, count: usize) -> Vec<i32> {
    for _ in 0..250 {
        let pids = read_pids(path);
        if pids.len() >= count {
            return pids;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("fewer than {count} pids written to {}", path.display());
}

/// Zombies count as gone; they only wait to be reaped
fn is_alive(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => !stat.contains(") Z "),
        Err(_) => false,
    }
}

/// Poll until `pid` is gone, within a bounded grace period
pub async fn wait_until_gone(pid: i32) -> bool {
    for _ in 0..150 {
        if !is_alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
