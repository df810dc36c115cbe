//! Run metadata written once per experiment
//!
//! A flat JSON record of the resolved configuration, read back by the
//! analysis tooling. Unset settings are omitted, trace files are recorded by
//! name only and the scheme list is a stringified list literal.

use serde::{Deserialize, Serialize};
use shared::{HostSide, Mode};
use std::path::{Path, PathBuf};

use crate::config::RunConfig;
use crate::context::file_name_of;
use crate::error::{OrchestratorError, OrchestratorResult};

pub const METADATA_FILE: &str = "pantheon_metadata.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub mode: Mode,
    pub flows: u32,
    pub runtime: u64,
    pub interval: u64,
    pub run_times: u32,
    pub start_run_id: u32,
    pub random_order: bool,
    pub cc_schemes: String,
    pub git_summary: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uplink_trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downlink_trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepend_mm_cmds: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub append_mm_cmds: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_mm_link_args: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_side: Option<HostSide>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_side: Option<HostSide>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_if: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_if: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ntp_addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,
}

/// `['a', 'b']`
pub fn format_scheme_list(schemes: &[String]) -> String {
    let quoted: Vec<String> = schemes.iter().map(|s| format!("'{s}'")).collect();
    format!("[{}]", quoted.join(", "))
}

/// Inverse of [`format_scheme_list`]
pub fn parse_scheme_list(text: &str) -> OrchestratorResult<Vec<String>> {
    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(|| OrchestratorError::config(format!("cc_schemes is not a list: {text}")))?;

    Ok(inner
        .split(',')
        .map(|item| item.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
        .filter(|item| !item.is_empty())
        .collect())
}

impl RunMetadata {
    pub fn from_config(config: &RunConfig, schemes: &[String], git_summary: impl Into<String>) -> Self {
        let link = config.link.as_ref();
        let remote = config.remote.as_ref();

        Self {
            mode: config.mode,
            flows: config.flows,
            runtime: config.runtime,
            interval: config.interval,
            run_times: config.run_times,
            start_run_id: config.start_run_id,
            random_order: config.random_order,
            cc_schemes: format_scheme_list(schemes),
            git_summary: git_summary.into(),
            uplink_trace: link.map(|l| file_name_of(&l.uplink_trace)),
            downlink_trace: link.map(|l| file_name_of(&l.downlink_trace)),
            prepend_mm_cmds: link.and_then(|l| l.prepend_mm_cmds.clone()),
            append_mm_cmds: link.and_then(|l| l.append_mm_cmds.clone()),
            extra_mm_link_args: link.and_then(|l| l.extra_mm_link_args.clone()),
            remote_path: remote.map(|r| r.remote_path.clone()),
            sender_side: remote.map(|r| r.sender_side),
            server_side: remote.map(|r| r.server_side),
            local_addr: remote.and_then(|r| r.local_addr.clone()),
            local_if: remote.and_then(|r| r.local_if.clone()),
            remote_if: remote.and_then(|r| r.remote_if.clone()),
            local_desc: remote.and_then(|r| r.local_desc.clone()),
            remote_desc: remote.and_then(|r| r.remote_desc.clone()),
            ntp_addr: remote.and_then(|r| r.ntp_addr.clone()),
            test_name: config.test_config.as_ref().map(|t| t.test_name.clone()),
        }
    }

    pub fn scheme_list(&self) -> OrchestratorResult<Vec<String>> {
        parse_scheme_list(&self.cc_schemes)
    }

    pub fn path(data_dir: &Path) -> PathBuf {
        data_dir.join(METADATA_FILE)
    }

    /// Write to `<data_dir>/pantheon_metadata.json`
    pub async fn write(&self, data_dir: &Path) -> OrchestratorResult<PathBuf> {
        let path = Self::path(data_dir);
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }

    pub async fn load(path: &Path) -> OrchestratorResult<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&text)?)
    }
}
