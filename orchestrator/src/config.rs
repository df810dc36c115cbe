//! Run configuration
//!
//! `RunConfig` is the resolved set of run parameters; it is built by the CLI
//! and validated once before any run executes.

use serde::{Deserialize, Serialize};
use shared::{HostSide, Mode};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{OrchestratorError, OrchestratorResult};

/// Emulated-link settings for local mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub uplink_trace: PathBuf,
    pub downlink_trace: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepend_mm_cmds: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub append_mm_cmds: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_mm_link_args: Option<String>,
}

/// Cross-host settings for remote mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// `user@host:/base/dir` of the peer
    pub remote_path: String,
    pub sender_side: HostSide,
    pub server_side: HostSide,
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
}

/// One flow of a multi-scheme test configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSpec {
    pub scheme: String,
}

/// Multi-scheme test: one scheme per flow, run as a single Test per run id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiFlowConfig {
    #[serde(rename = "test-name", alias = "test_name")]
    pub test_name: String,
    pub flows: Vec<FlowSpec>,
}

impl MultiFlowConfig {
    pub async fn load(path: &Path) -> OrchestratorResult<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        let config: MultiFlowConfig = serde_json::from_str(&text)?;
        if config.flows.is_empty() {
            return Err(OrchestratorError::config(format!(
                "test config {} lists no flows",
                path.display()
            )));
        }
        Ok(config)
    }

    /// Scheme names in flow order, duplicates removed
    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = Vec::new();
        for flow in &self.flows {
            if !schemes.contains(&flow.scheme) {
                schemes.push(flow.scheme.clone());
            }
        }
        schemes
    }
}

/// Fully resolved parameters of an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub mode: Mode,
    /// Number of tunnelled flows; 0 runs the scheme directly
    pub flows: u32,
    /// Total runtime of one run, in seconds
    pub runtime: u64,
    /// Interval between starting successive flows, in seconds
    pub interval: u64,
    pub run_times: u32,
    pub start_run_id: u32,
    pub random_order: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_config: Option<MultiFlowConfig>,
}

impl RunConfig {
    pub fn runtime(&self) -> Duration {
        Duration::from_secs(self.runtime)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// Run ids in execution order
    pub fn run_ids(&self) -> std::ops::Range<u32> {
        self.start_run_id..self.start_run_id.saturating_add(self.run_times)
    }

    /// Host of the sending side. In local mode "remote" is the far side of
    /// the emulated link.
    pub fn sender_side(&self) -> HostSide {
        self.remote.as_ref().map(|r| r.sender_side).unwrap_or(HostSide::Remote)
    }

    /// Host of the tunnel server. In local mode it is outside the emulated link.
    pub fn server_side(&self) -> HostSide {
        self.remote.as_ref().map(|r| r.server_side).unwrap_or(HostSide::Local)
    }

    pub fn ntp_addr(&self) -> Option<&str> {
        self.remote.as_ref().and_then(|r| r.ntp_addr.as_deref())
    }

    /// Check the combination of settings before anything runs
    pub fn validate(&self) -> OrchestratorResult<()> {
        if self.runtime == 0 {
            return Err(OrchestratorError::config("runtime must be greater than 0"));
        }
        if self.run_times == 0 {
            return Err(OrchestratorError::config("run_times must be greater than 0"));
        }
        if self.start_run_id == 0 {
            return Err(OrchestratorError::config("start_run_id must be a positive integer"));
        }
        if self.start_run_id.checked_add(self.run_times).is_none() {
            return Err(OrchestratorError::config(format!(
                "run ids from {} for {} runs exceed {}",
                self.start_run_id,
                self.run_times,
                u32::MAX
            )));
        }

        match self.mode {
            Mode::Local if self.link.is_none() => {
                return Err(OrchestratorError::config("local mode needs uplink and downlink traces"));
            }
            Mode::Remote => {
                let Some(remote) = self.remote.as_ref() else {
                    return Err(OrchestratorError::config("remote mode needs a remote path"));
                };
                if self.flows == 0 {
                    return Err(OrchestratorError::config("remote mode needs at least one flow"));
                }
                if remote.server_side == HostSide::Local && remote.local_addr.is_none() {
                    return Err(OrchestratorError::config(
                        "local address is required when the tunnel server is local",
                    ));
                }
            }
            Mode::Local => {}
        }

        if let Some(test_config) = &self.test_config {
            if test_config.flows.len() as u32 != self.flows {
                return Err(OrchestratorError::config(format!(
                    "test config {} has {} flows but {} were requested",
                    test_config.test_name,
                    test_config.flows.len(),
                    self.flows
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> RunConfig {
        RunConfig {
            mode: Mode::Local,
            flows: 1,
            runtime: 30,
            interval: 0,
            run_times: 1,
            start_run_id: 1,
            random_order: false,
            link: Some(LinkConfig {
                uplink_trace: PathBuf::from("/traces/12mbps.trace"),
                downlink_trace: PathBuf::from("/traces/12mbps.trace"),
                prepend_mm_cmds: None,
                append_mm_cmds: None,
                extra_mm_link_args: None,
            }),
            remote: None,
            test_config: None,
        }
    }

    fn remote_config() -> RemoteConfig {
        RemoteConfig {
            remote_path: "exp@10.0.0.2:/srv/pantheon".to_string(),
            sender_side: HostSide::Local,
            server_side: HostSide::Local,
            local_addr: Some("10.0.0.1".to_string()),
            local_if: None,
            remote_if: None,
            local_desc: None,
            remote_desc: None,
            ntp_addr: None,
        }
    }

    #[test]
    fn test_local_defaults_for_sides() {
        let config = local_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.sender_side(), HostSide::Remote);
        assert_eq!(config.server_side(), HostSide::Local);
        assert_eq!(config.run_ids().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_run_ids_start_at_offset() {
        let mut config = local_config();
        config.start_run_id = 4;
        config.run_times = 3;
        assert_eq!(config.run_ids().collect::<Vec<_>>(), vec![4, 5, 6]);
    }

    #[test]
    fn test_run_id_range_must_fit() {
        let mut config = local_config();
        config.start_run_id = u32::MAX;
        config.run_times = 2;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration { .. }), "{err:?}");
        assert_eq!(config.run_ids().count(), 0);

        config.start_run_id = u32::MAX - 1;
        config.run_times = 1;
        assert!(config.validate().is_ok());
        assert_eq!(config.run_ids().collect::<Vec<_>>(), vec![u32::MAX - 1]);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = local_config();
        config.link = None;
        assert!(config.validate().is_err());

        let mut config = local_config();
        config.runtime = 0;
        assert!(config.validate().is_err());

        let mut config = local_config();
        config.mode = Mode::Remote;
        assert!(config.validate().is_err());

        let mut remote = remote_config();
        remote.local_addr = None;
        let mut config = local_config();
        config.mode = Mode::Remote;
        config.remote = Some(remote);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_test_config_flow_count_must_match() {
        let mut config = local_config();
        config.flows = 2;
        config.test_config = Some(MultiFlowConfig {
            test_name: "mixed".to_string(),
            flows: vec![FlowSpec {
                scheme: "cubic".to_string(),
            }],
        });
        assert!(config.validate().is_err());

        config.flows = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_multi_flow_config_parsing() {
        let json = r#"{"test-name": "mixed", "flows": [{"scheme": "cubic"}, {"scheme": "vegas"}, {"scheme": "cubic"}]}"#;
        let config: MultiFlowConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.test_name, "mixed");
        assert_eq!(config.flows.len(), 3);
        assert_eq!(config.schemes(), vec!["cubic", "vegas"]);
    }

    #[tokio::test]
    async fn test_multi_flow_config_load_rejects_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.json");
        std::fs::write(&path, r#"{"test-name": "none", "flows": []}"#).unwrap();

        assert!(MultiFlowConfig::load(&path).await.is_err());
    }
}
