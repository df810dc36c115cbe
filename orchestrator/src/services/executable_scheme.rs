//! Scheme backed by an external executable
//!
//! The executable is invoked as `<path> deps|setup|run_first|receiver|sender`.
//! The receiver and sender run in their own process group, optionally
//! inside the emulated link, and the group is killed if the run is dropped.

use async_trait::async_trait;
use shared::{ManagedProcess, Side, StdioPlan};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use crate::core::EmulatedLink;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::services::command;
use crate::traits::Scheme;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableScheme {
    name: String,
    path: PathBuf,
    link: Option<EmulatedLink>,
}

impl ExecutableScheme {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            link: None,
        }
    }

    /// Run the receiver and sender inside `link`. Their arguments then pass
    /// through a shell there, so `$MAHIMAHI_BASE` resolves to the far end.
    pub fn inside_link(mut self, link: EmulatedLink) -> Self {
        self.link = Some(link);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Command line of one side of the scheme
    pub fn side_argv(&self, side: Side, args: &[String]) -> Vec<String> {
        let argv = self.argv(side.as_str(), args);
        match &self.link {
            Some(link) => link.wrap_shell(&argv.join(" ")),
            None => argv,
        }
    }

    async fn run_side(&self, side: Side, args: &[String]) -> OrchestratorResult<ExitStatus> {
        let mut process = ManagedProcess::start(&self.side_argv(side, args), StdioPlan::DETACHED)?;
        Ok(process.wait().await?)
    }

    fn argv(&self, operation: &str, args: &[String]) -> Vec<String> {
        let mut argv = vec![self.path.display().to_string(), operation.to_string()];
        argv.extend(args.iter().cloned());
        argv
    }

    async fn query(&self, operation: &str) -> OrchestratorResult<String> {
        command::check_output(&self.argv(operation, &[]))
            .await
            .map_err(|e| OrchestratorError::scheme(&self.name, format!("{operation} failed: {e}")))
    }
}

#[async_trait]
impl Scheme for ExecutableScheme {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn deps(&self) -> OrchestratorResult<Vec<String>> {
        let out = self.query("deps").await?;
        Ok(out.split_whitespace().map(str::to_string).collect())
    }

    async fn setup(&self) -> OrchestratorResult<()> {
        command::check_call(&self.argv("setup", &[]))
            .await
            .map_err(|e| OrchestratorError::scheme(&self.name, format!("setup failed: {e}")))
    }

    async fn run_first(&self) -> OrchestratorResult<Side> {
        let out = self.query("run_first").await?;
        out.parse::<Side>()
            .map_err(|e| OrchestratorError::scheme(&self.name, e.to_string()))
    }

    async fn receiver(&self, args: Vec<String>) -> OrchestratorResult<ExitStatus> {
        self.run_side(Side::Receiver, &args).await
    }

    async fn sender(&self, args: Vec<String>) -> OrchestratorResult<ExitStatus> {
        self.run_side(Side::Sender, &args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkConfig;
    use std::os::unix::fs::PermissionsExt;

    fn fake_scheme(dir: &Path, body: &str) -> ExecutableScheme {
        let path = dir.join("fake");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        ExecutableScheme::new("fake", path)
    }

    #[tokio::test]
    async fn test_queries_follow_executable_contract() {
        let dir = tempfile::tempdir().unwrap();
        let scheme = fake_scheme(
            dir.path(),
            r#"case "$1" in
  deps) echo "iperf  libfoo-dev" ;;
  run_first) echo receiver ;;
  setup) exit 0 ;;
  receiver) [ "$2" = 9000 ] ;;
  sender) exit 4 ;;
esac"#,
        );

        assert_eq!(scheme.deps().await.unwrap(), vec!["iperf", "libfoo-dev"]);
        assert_eq!(scheme.run_first().await.unwrap(), Side::Receiver);
        scheme.setup().await.unwrap();

        let status = scheme.receiver(vec!["9000".to_string()]).await.unwrap();
        assert!(status.success());
        let status = scheme
            .sender(vec!["10.0.0.1".to_string(), "9000".to_string()])
            .await
            .unwrap();
        assert_eq!(status.code(), Some(4));
    }

    #[test]
    fn test_side_inside_link_goes_through_shell() {
        let config = LinkConfig {
            uplink_trace: PathBuf::from("/traces/up.trace"),
            downlink_trace: PathBuf::from("/traces/down.trace"),
            prepend_mm_cmds: None,
            append_mm_cmds: None,
            extra_mm_link_args: None,
        };
        let link = EmulatedLink::build(&config, Path::new("/data"), "cubic", 1, Some(Side::Receiver), 0);
        let scheme = ExecutableScheme::new("cubic", "/schemes/cubic");
        let args = vec!["$MAHIMAHI_BASE".to_string(), "9000".to_string()];

        assert_eq!(
            scheme.side_argv(Side::Sender, &args),
            vec!["/schemes/cubic", "sender", "$MAHIMAHI_BASE", "9000"]
        );

        let linked = scheme.inside_link(link.clone()).side_argv(Side::Sender, &args);
        assert_eq!(&linked[..link.command.len()], &link.command[..]);
        assert_eq!(
            &linked[link.command.len()..],
            ["--", "sh", "-c", "/schemes/cubic sender $MAHIMAHI_BASE 9000"]
        );
    }

    #[tokio::test]
    async fn test_dropped_side_kills_its_group() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("receiver.pid");
        let scheme = fake_scheme(dir.path(), &format!("echo $$ > {}\nexec sleep 30", pid_file.display()));

        let run = scheme.receiver(vec!["9000".to_string()]);
        let pid = tokio::select! {
            _ = run => panic!("receiver exited on its own"),
            pid = async {
                loop {
                    if let Some(pid) = std::fs::read_to_string(&pid_file)
                        .ok()
                        .and_then(|text| text.trim().parse::<i32>().ok())
                    {
                        break pid;
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                }
            } => pid,
        };

        let mut gone = false;
        for _ in 0..100 {
            match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
                Ok(stat) if !stat.contains(") Z ") => {}
                _ => {
                    gone = true;
                    break;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(gone, "receiver {pid} outlived its dropped run");
    }

    #[tokio::test]
    async fn test_bad_run_first_is_scheme_error() {
        let dir = tempfile::tempdir().unwrap();
        let scheme = fake_scheme(dir.path(), "echo both");

        let err = scheme.run_first().await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Scheme { .. }));
    }

    #[tokio::test]
    async fn test_failing_setup_is_scheme_error() {
        let dir = tempfile::tempdir().unwrap();
        let scheme = fake_scheme(dir.path(), "exit 1");

        assert!(matches!(scheme.setup().await, Err(OrchestratorError::Scheme { .. })));
    }
}
