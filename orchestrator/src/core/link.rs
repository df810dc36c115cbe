//! Emulated-link command line for local mode

use shared::Side;
use std::path::{Path, PathBuf};

use crate::config::LinkConfig;

/// `mm-link` invocation plus the capacity logs it writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulatedLink {
    pub command: Vec<String>,
    pub datalink_log: PathBuf,
    pub acklink_log: PathBuf,
}

fn split_fragment(fragment: Option<&str>) -> impl Iterator<Item = String> + '_ {
    fragment.into_iter().flat_map(|f| f.split_whitespace().map(str::to_string))
}

impl EmulatedLink {
    /// Build the link for one run. Data flows on the uplink when the
    /// receiver listens first or when tunnels are used; otherwise the link
    /// is reversed.
    pub fn build(config: &LinkConfig, data_dir: &Path, name: &str, run_id: u32, run_first: Option<Side>, flows: u32) -> Self {
        let datalink_log = data_dir.join(format!("{name}_mm_datalink_run{run_id}.log"));
        let acklink_log = data_dir.join(format!("{name}_mm_acklink_run{run_id}.log"));

        let data_on_uplink = run_first == Some(Side::Receiver) || flows > 0;
        let (uplink_log, downlink_log, uplink_trace, downlink_trace) = if data_on_uplink {
            (&datalink_log, &acklink_log, &config.uplink_trace, &config.downlink_trace)
        } else {
            (&acklink_log, &datalink_log, &config.downlink_trace, &config.uplink_trace)
        };

        let mut command: Vec<String> = split_fragment(config.prepend_mm_cmds.as_deref()).collect();
        command.extend([
            "mm-link".to_string(),
            uplink_trace.display().to_string(),
            downlink_trace.display().to_string(),
            format!("--uplink-log={}", uplink_log.display()),
            format!("--downlink-log={}", downlink_log.display()),
        ]);
        command.extend(split_fragment(config.extra_mm_link_args.as_deref()));
        command.extend(split_fragment(config.append_mm_cmds.as_deref()));

        Self {
            command,
            datalink_log,
            acklink_log,
        }
    }

    /// Link command running `inner` inside the emulated network
    pub fn wrap<S: AsRef<str>>(&self, inner: &[S]) -> Vec<String> {
        let mut argv = self.command.clone();
        argv.extend(inner.iter().map(|a| a.as_ref().to_string()));
        argv
    }

    /// Link command running a shell line inside the emulated network, so
    /// that `$MAHIMAHI_BASE` is expanded there
    pub fn wrap_shell(&self, script: &str) -> Vec<String> {
        self.wrap(&["--", "sh", "-c", script])
    }
}
