//! Scratch experiment layout with fake scheme, manager and link tools

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use orchestrator::core::tunnel::RetryPolicy;
use orchestrator::{Experiment, ExperimentContext, LinkConfig, RunConfig, SchemeRegistry, Timing};
use shared::Mode;
use tempfile::TempDir;

/// Reply of the fake tunnel server to `readline`
pub const CLIENT_LINE: &str = "mm-tunnelclient localhost 40000 100.64.0.4 100.64.0.3";

/// Write an executable `/bin/sh` script named `name` into `dir`
pub fn write_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Scheme that listens first on the receiver side and otherwise just
/// records its pid and sleeps
fn scheme_script(pids: &Path) -> String {
    format!(
        r#"case "$1" in
  deps) echo iperf3 ;;
  setup) ;;
  run_first) echo receiver ;;
  receiver|sender) echo $$ >> {pids}; exec sleep 30 ;;
esac"#,
        pids = pids.display()
    )
}

/// Tunnel manager speaking the line protocol. Tunnel endpoints only write
/// their logs; forwarded scheme lines are run in the background.
fn manager_script(pids: &Path) -> String {
    format!(
        r#"echo $$ >> {pids}
echo "tunnel manager is running"
kind=none
while read -r head id prog rest; do
  case "$head" in
    halt) exit 0 ;;
    prompt) continue ;;
  esac
  case "$prog" in
    mm-tunnelserver|mm-tunnelclient)
      kind=$prog
      for arg in $rest; do
        case "$arg" in
          --ingress-log=*) printf '# init timestamp: 1000\n0 - 1 - 1500\n5 - 2 - 1500\n' > "${{arg#--ingress-log=}}" ;;
          --egress-log=*) printf '# init timestamp: 1000\n10 - 1 - 1500\n15 - 2 - 1500\n' > "${{arg#--egress-log=}}" ;;
        esac
      done ;;
    readline)
      if [ "$kind" = mm-tunnelserver ]; then echo "{CLIENT_LINE}"; else echo "got connection"; fi ;;
    python) $rest > /dev/null & ;;
  esac
done"#,
        pids = pids.display()
    )
}

/// Stand-in for `mm-link UP DOWN --uplink-log=X --downlink-log=Y CMD...`:
/// writes one capacity sample to each link log, then runs CMD
const LINK_SCRIPT: &str = r#"for arg in "$4" "$5"; do
  printf '# init timestamp: 1000\n0 # 1500\n' > "${arg#*=}"
done
shift 5
[ "$1" = "--" ] && shift
exec "$@""#;

pub struct ExperimentFixture {
    pub dir: TempDir,
    pub scheme_pids: PathBuf,
    pub manager_pids: PathBuf,
    pub link_wrapper: PathBuf,
    pub manager: PathBuf,
}

impl ExperimentFixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        let scheme_dir = base.join("schemes");
        std::fs::create_dir_all(&scheme_dir).unwrap();

        let scheme_pids = base.join("scheme.pids");
        let manager_pids = base.join("manager.pids");
        write_tool(&scheme_dir, "cubic", &scheme_script(&scheme_pids));
        let manager = write_tool(base, "tunnel-manager", &manager_script(&manager_pids));
        let link_wrapper = write_tool(base, "fake-link", LINK_SCRIPT);

        Self {
            dir,
            scheme_pids,
            manager_pids,
            link_wrapper,
            manager,
        }
    }

    pub fn base(&self) -> &Path {
        self.dir.path()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.base().join("data")
    }

    pub fn context(&self) -> ExperimentContext {
        ExperimentContext::new(self.base(), self.data_dir()).with_tunnel_manager(&self.manager)
    }

    /// Local-mode config whose link command is the fake wrapper
    pub fn local_config(&self, flows: u32, runtime: u64) -> RunConfig {
        RunConfig {
            mode: Mode::Local,
            flows,
            runtime,
            interval: 0,
            run_times: 1,
            start_run_id: 1,
            random_order: false,
            link: Some(LinkConfig {
                uplink_trace: PathBuf::from("/traces/12mbps.trace"),
                downlink_trace: PathBuf::from("/traces/12mbps.trace"),
                prepend_mm_cmds: Some(self.link_wrapper.display().to_string()),
                append_mm_cmds: None,
                extra_mm_link_args: None,
            }),
            remote: None,
            test_config: None,
        }
    }

    pub fn experiment(&self, config: RunConfig) -> Experiment {
        let ctx = self.context();
        let registry = SchemeRegistry::new(&ctx.scheme_dir);
        Experiment::new(ctx, config, registry, vec!["cubic".to_string()])
            .unwrap()
            .with_timing(fast_timing())
    }
}

/// Short delays so a run takes about a second
pub fn fast_timing() -> Timing {
    Timing {
        settle: Duration::from_millis(100),
        reply_timeout: Duration::from_secs(5),
        ready_timeout: Duration::from_secs(5),
        halt_grace: Duration::from_secs(2),
        retry: RetryPolicy {
            attempts: 3,
            attempt_timeout: Duration::from_secs(2),
        },
    }
}
