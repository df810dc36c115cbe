//! Scheme registry and resolved flows

use shared::Side;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use crate::context::RemoteHost;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::services::ExecutableScheme;
use crate::traits::Scheme;

/// Locates scheme executables by name.
///
/// Explicit registrations win; otherwise `<scheme_dir>/<name>` is used.
#[derive(Debug, Clone, Default)]
pub struct SchemeRegistry {
    scheme_dir: PathBuf,
    registered: HashMap<String, PathBuf>,
}

impl SchemeRegistry {
    pub fn new(scheme_dir: impl Into<PathBuf>) -> Self {
        Self {
            scheme_dir: scheme_dir.into(),
            registered: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.registered.insert(name.into(), path.into());
    }

    /// Path of the executable for `name`, whether or not it exists
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.registered
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.scheme_dir.join(name))
    }

    pub fn resolve(&self, name: &str) -> OrchestratorResult<ExecutableScheme> {
        let path = self.path_of(name);
        if !path.is_file() {
            return Err(OrchestratorError::scheme(
                name,
                format!("no executable at {}", path.display()),
            ));
        }
        Ok(ExecutableScheme::new(name, path))
    }
}

/// One sender/receiver relationship, immutable once resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    pub scheme: String,
    pub local_path: PathBuf,
    pub remote_path: Option<String>,
    pub first: Side,
    pub second: Side,
}

impl Flow {
    pub fn new(scheme: impl Into<String>, local_path: impl Into<PathBuf>, remote_path: Option<String>, first: Side) -> Self {
        Self {
            scheme: scheme.into(),
            local_path: local_path.into(),
            remote_path,
            first,
            second: first.opposite(),
        }
    }

    /// Build a flow by asking `scheme` which side runs first
    pub async fn resolve(
        scheme: &dyn Scheme,
        local_path: &Path,
        remote: Option<&RemoteHost>,
    ) -> OrchestratorResult<Self> {
        let name = scheme.name();
        let first = scheme.run_first().await?;
        let remote_path = remote.map(|host| host.scheme_path(&name));
        Ok(Self::new(name, local_path, remote_path, first))
    }

    /// Executable path as seen from the host that runs it
    pub fn executable(&self, on_remote: bool) -> String {
        match (&self.remote_path, on_remote) {
            (Some(remote), true) => remote.clone(),
            _ => self.local_path.display().to_string(),
        }
    }

    /// Command line starting the side that listens first
    pub fn first_command(&self, executable: &str, port: u16) -> String {
        format!("{executable} {} {port}", self.first)
    }

    /// Command line starting the side that connects to `peer_ip`
    pub fn second_command(&self, executable: &str, peer_ip: &str, port: u16) -> String {
        format!("{executable} {} {peer_ip} {port}", self.second)
    }
}

/// Run one side of `scheme` to completion
pub async fn run_side(scheme: &dyn Scheme, side: Side, args: Vec<String>) -> OrchestratorResult<ExitStatus> {
    match side {
        Side::Receiver => scheme.receiver(args).await,
        Side::Sender => scheme.sender(args).await,
    }
}
