//! Experiment context passed explicitly to every component
//!
//! Holds the directories and tool locations a run needs, plus the remote
//! host description in cross-host mode.

use std::path::{Path, PathBuf};

use crate::error::{OrchestratorError, OrchestratorResult};

/// Directory and tool layout for one experiment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentContext {
    pub base_dir: PathBuf,
    pub data_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub scheme_dir: PathBuf,
    pub tunnel_manager: PathBuf,
    pub remote: Option<RemoteHost>,
}

impl ExperimentContext {
    /// Context rooted at `base_dir` with the conventional `tmp` and
    /// `schemes` subdirectories
    pub fn new(base_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            tmp_dir: base_dir.join("tmp"),
            scheme_dir: base_dir.join("schemes"),
            tunnel_manager: default_tunnel_manager(),
            data_dir: data_dir.into(),
            base_dir,
            remote: None,
        }
    }

    pub fn with_remote(mut self, remote: Option<RemoteHost>) -> Self {
        self.remote = remote;
        self
    }

    pub fn with_scheme_dir(mut self, scheme_dir: impl Into<PathBuf>) -> Self {
        self.scheme_dir = scheme_dir.into();
        self
    }

    pub fn with_tmp_dir(mut self, tmp_dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = tmp_dir.into();
        self
    }

    pub fn with_tunnel_manager(mut self, tunnel_manager: impl Into<PathBuf>) -> Self {
        self.tunnel_manager = tunnel_manager.into();
        self
    }

    /// Create the data and temp directories
    pub async fn ensure_dirs(&self) -> OrchestratorResult<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        tokio::fs::create_dir_all(&self.tmp_dir).await?;
        Ok(())
    }

    pub fn tmp_path(&self, name: &str) -> PathBuf {
        self.tmp_dir.join(name)
    }

    pub fn data_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }
}

/// `tunnel-manager` next to the running executable, or on `PATH`
fn default_tunnel_manager() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("tunnel-manager")))
        .filter(|candidate| candidate.exists())
        .unwrap_or_else(|| PathBuf::from("tunnel-manager"))
}

/// Peer host reached over ssh in cross-host mode.
///
/// Remote paths are kept as strings: they name files on another machine
/// and are only ever passed through to `ssh` and `scp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHost {
    pub host_addr: String,
    pub ip: String,
    pub base_dir: String,
    pub tmp_dir: String,
    pub tunnel_manager: String,
    pub scheme_dir: String,
}

impl RemoteHost {
    /// Parse `user@host:/base/dir`; the last `:` separates host and base dir
    pub fn parse(remote_path: &str) -> OrchestratorResult<Self> {
        let (host_addr, base_dir) = remote_path
            .rsplit_once(':')
            .filter(|(host, dir)| !host.is_empty() && !dir.is_empty())
            .ok_or_else(|| {
                OrchestratorError::config(format!(
                    "remote path must look like user@host:/path/to/base, got {remote_path:?}"
                ))
            })?;

        let ip = host_addr.rsplit('@').next().unwrap_or(host_addr).to_string();
        let base_dir = base_dir.trim_end_matches('/').to_string();

        Ok(Self {
            host_addr: host_addr.to_string(),
            ip,
            tmp_dir: format!("{base_dir}/tmp"),
            tunnel_manager: format!("{base_dir}/bin/tunnel-manager"),
            scheme_dir: format!("{base_dir}/schemes"),
            base_dir,
        })
    }

    /// Command prefix running the rest of an argv on the remote host
    pub fn ssh_prefix(&self) -> Vec<String> {
        vec!["ssh".to_string(), self.host_addr.clone()]
    }

    /// `ssh_prefix` followed by `argv`
    pub fn wrap<S: AsRef<str>>(&self, argv: &[S]) -> Vec<String> {
        let mut wrapped = self.ssh_prefix();
        wrapped.extend(argv.iter().map(|a| a.as_ref().to_string()));
        wrapped
    }

    pub fn scheme_path(&self, scheme: &str) -> String {
        format!("{}/{}", self.scheme_dir, scheme)
    }

    pub fn tmp_path(&self, name: &str) -> String {
        format!("{}/{}", self.tmp_dir, name)
    }

    /// `host:path` as understood by scp
    pub fn scp_source(&self, remote_path: &str) -> String {
        format!("{}:{}", self.host_addr, remote_path)
    }
}

/// File name component of `path`, or the whole path when it has none
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_host_parsing() {
        let remote = RemoteHost::parse("exp@10.1.2.3:/home/exp/pantheon/").unwrap();

        assert_eq!(remote.host_addr, "exp@10.1.2.3");
        assert_eq!(remote.ip, "10.1.2.3");
        assert_eq!(remote.base_dir, "/home/exp/pantheon");
        assert_eq!(remote.tmp_dir, "/home/exp/pantheon/tmp");
        assert_eq!(remote.tunnel_manager, "/home/exp/pantheon/bin/tunnel-manager");
        assert_eq!(remote.scheme_path("cubic"), "/home/exp/pantheon/schemes/cubic");
        assert_eq!(remote.ssh_prefix(), vec!["ssh", "exp@10.1.2.3"]);
        assert_eq!(remote.scp_source("/x/y.log"), "exp@10.1.2.3:/x/y.log");
    }

    #[test]
    fn test_remote_host_without_user() {
        let remote = RemoteHost::parse("peer:/srv/base").unwrap();
        assert_eq!(remote.ip, "peer");
        assert_eq!(remote.wrap(&["ls", "-l"]), vec!["ssh", "peer", "ls", "-l"]);
    }

    #[test]
    fn test_remote_host_rejects_malformed() {
        assert!(RemoteHost::parse("no-colon-here").is_err());
        assert!(RemoteHost::parse(":/only/dir").is_err());
        assert!(RemoteHost::parse("host:").is_err());
    }

    #[test]
    fn test_context_layout() {
        let ctx = ExperimentContext::new("/opt/base", "/data/out");
        assert_eq!(ctx.tmp_dir, PathBuf::from("/opt/base/tmp"));
        assert_eq!(ctx.scheme_dir, PathBuf::from("/opt/base/schemes"));
        assert_eq!(ctx.data_path("a.log"), PathBuf::from("/data/out/a.log"));
        assert!(ctx.remote.is_none());
    }
}
