//! Source-control summaries and remote file transfer

use std::path::Path;

use crate::context::RemoteHost;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::services::command;
use shared::{process_warn, ProcessId};

/// Branch, HEAD commit, and per-submodule heads plus tracked changes
pub const GIT_SUMMARY_SCRIPT: &str = r#"printf 'branch: '
git rev-parse --abbrev-ref @ | tr -d '\n'
printf ' @ '
git rev-parse @
git submodule foreach --quiet 'echo $path @ `git rev-parse @`; git status -s --untracked-files=no --porcelain'
"#;

async fn summarize(argv: &[String], cwd: Option<&Path>, whereabouts: &str) -> OrchestratorResult<String> {
    let (status, summary) = command::run_script(argv, GIT_SUMMARY_SCRIPT, cwd).await?;
    if !status.success() {
        process_warn!(
            ProcessId::current(),
            "git summary on {} exited with {}; recording partial output",
            whereabouts,
            status
        );
    }
    Ok(summary)
}

/// Summary of the repository checked out at `base_dir`
pub async fn git_summary(base_dir: &Path) -> OrchestratorResult<String> {
    summarize(&["sh".to_string(), "-s".to_string()], Some(base_dir), "local host").await
}

/// Summary of the repository checked out in the remote base directory
pub async fn remote_git_summary(remote: &RemoteHost) -> OrchestratorResult<String> {
    let remote_cmd = format!("cd {} && sh -s", remote.base_dir);
    summarize(&remote.wrap(&[remote_cmd]), None, &remote.host_addr).await
}

/// Both sides must run the same code
pub fn ensure_same_revision(local: &str, remote: &str) -> OrchestratorResult<()> {
    if local == remote {
        Ok(())
    } else {
        Err(OrchestratorError::RemoteDivergence {
            local: local.to_string(),
            remote: remote.to_string(),
        })
    }
}

/// Make sure the remote temp directory exists
pub async fn prepare_remote_tmp(remote: &RemoteHost) -> OrchestratorResult<()> {
    command::check_call(&remote.wrap(&["mkdir", "-p", remote.tmp_dir.as_str()])).await
}

/// Copy a remote file to `local_path` with `scp -C`. A failed copy is
/// logged; the merge step reports the missing file.
pub async fn pull_log(remote: &RemoteHost, remote_path: &str, local_path: &Path) -> OrchestratorResult<()> {
    let argv = vec![
        "scp".to_string(),
        "-C".to_string(),
        remote.scp_source(remote_path),
        local_path.display().to_string(),
    ];
    let status = command::call(&argv).await?;
    if !status.success() {
        process_warn!(ProcessId::current(), "scp of {} exited with {}", remote_path, status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divergence_is_reported_with_both_summaries() {
        assert!(ensure_same_revision("branch: main @ abc\n", "branch: main @ abc\n").is_ok());

        let err = ensure_same_revision("branch: main @ abc\n", "branch: main @ def\n").unwrap_err();
        match err {
            OrchestratorError::RemoteDivergence { local, remote } => {
                assert!(local.contains("abc"));
                assert!(remote.contains("def"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_git_summary_outside_repository_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let summary = git_summary(dir.path()).await.unwrap();
        assert!(summary.starts_with("branch: "));
    }
}
