//! Log-set planning
//!
//! Every flow gets four endpoint logs (datalink/acklink × ingress/egress),
//! named with a fresh uuid so concurrent runs sharing a temp directory never
//! collide. In cross-host runs the logs written by the remote tunnel endpoint
//! live on the remote host until they are pulled.

use shared::HostSide;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::context::RemoteHost;

/// Traffic direction of a tested path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Datalink,
    Acklink,
}

/// Where one endpoint log is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLocation {
    Local(PathBuf),
    Remote(String),
}

impl LogLocation {
    /// Path as passed to the tunnel endpoint writing it
    pub fn as_arg(&self) -> String {
        match self {
            LogLocation::Local(path) => path.display().to_string(),
            LogLocation::Remote(path) => path.clone(),
        }
    }

    pub fn file_name(&self) -> String {
        match self {
            LogLocation::Local(path) => crate::context::file_name_of(path),
            LogLocation::Remote(path) => path.rsplit('/').next().unwrap_or(path).to_string(),
        }
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            LogLocation::Local(path) => Some(path),
            LogLocation::Remote(_) => None,
        }
    }
}

/// The four endpoint logs of one flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowLogs {
    pub uid: Uuid,
    pub datalink_ingress: LogLocation,
    pub datalink_egress: LogLocation,
    pub acklink_ingress: LogLocation,
    pub acklink_egress: LogLocation,
}

fn log_flags(ingress: &LogLocation, egress: &LogLocation) -> Vec<String> {
    vec![
        format!("--ingress-log={}", ingress.as_arg()),
        format!("--egress-log={}", egress.as_arg()),
    ]
}

impl FlowLogs {
    /// Log flags for the tunnel server. `server_with_sender` is true when
    /// the server runs on the sender's host.
    pub fn server_args(&self, server_with_sender: bool) -> Vec<String> {
        if server_with_sender {
            log_flags(&self.acklink_ingress, &self.datalink_egress)
        } else {
            log_flags(&self.datalink_ingress, &self.acklink_egress)
        }
    }

    /// Log flags for the tunnel client, the complement of the server's
    pub fn client_args(&self, server_with_sender: bool) -> Vec<String> {
        if server_with_sender {
            log_flags(&self.datalink_ingress, &self.acklink_egress)
        } else {
            log_flags(&self.acklink_ingress, &self.datalink_egress)
        }
    }

    pub fn pair(&self, direction: Direction) -> (&LogLocation, &LogLocation) {
        match direction {
            Direction::Datalink => (&self.datalink_ingress, &self.datalink_egress),
            Direction::Acklink => (&self.acklink_ingress, &self.acklink_egress),
        }
    }

    /// Remote logs in this flow, each with the local path it is pulled to
    pub fn remote_logs(&self, tmp_dir: &Path) -> Vec<(String, PathBuf)> {
        [
            &self.datalink_ingress,
            &self.datalink_egress,
            &self.acklink_ingress,
            &self.acklink_egress,
        ]
        .into_iter()
        .filter_map(|location| match location {
            LogLocation::Remote(path) => Some((path.clone(), tmp_dir.join(location.file_name()))),
            LogLocation::Local(_) => None,
        })
        .collect()
    }

    /// Point every remote log at its pulled local copy
    pub fn localize(&mut self, tmp_dir: &Path) {
        for location in [
            &mut self.datalink_ingress,
            &mut self.datalink_egress,
            &mut self.acklink_ingress,
            &mut self.acklink_egress,
        ] {
            if let LogLocation::Remote(_) = location {
                *location = LogLocation::Local(tmp_dir.join(location.file_name()));
            }
        }
    }
}

/// All logs of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSet {
    pub datalink_name: String,
    pub acklink_name: String,
    pub datalink_log: PathBuf,
    pub acklink_log: PathBuf,
    pub flows: BTreeMap<u32, FlowLogs>,
}

impl LogSet {
    /// Plan logs for tunnels `1..=flows`. `remote` carries the peer and
    /// the sender's host in cross-host mode.
    pub fn plan(
        data_dir: &Path,
        tmp_dir: &Path,
        name: &str,
        run_id: u32,
        flows: u32,
        remote: Option<(&RemoteHost, HostSide)>,
    ) -> Self {
        let datalink_name = format!("{name}_datalink_run{run_id}");
        let acklink_name = format!("{name}_acklink_run{run_id}");

        let mut planned = BTreeMap::new();
        for tunnel_id in 1..=flows {
            let uid = Uuid::new_v4();
            let file = |base: &str, point: &str| format!("{base}_flow{tunnel_id}_uid{uid}.log.{point}");
            let local = |file: String| LogLocation::Local(tmp_dir.join(file));

            let mut logs = FlowLogs {
                uid,
                datalink_ingress: local(file(&datalink_name, "ingress")),
                datalink_egress: local(file(&datalink_name, "egress")),
                acklink_ingress: local(file(&acklink_name, "ingress")),
                acklink_egress: local(file(&acklink_name, "egress")),
            };

            if let Some((host, sender_side)) = remote {
                let on_remote = |file: String| LogLocation::Remote(host.tmp_path(&file));
                match sender_side {
                    HostSide::Local => {
                        logs.datalink_ingress = on_remote(file(&datalink_name, "ingress"));
                        logs.acklink_egress = on_remote(file(&acklink_name, "egress"));
                    }
                    HostSide::Remote => {
                        logs.datalink_egress = on_remote(file(&datalink_name, "egress"));
                        logs.acklink_ingress = on_remote(file(&acklink_name, "ingress"));
                    }
                }
            }

            planned.insert(tunnel_id, logs);
        }

        Self {
            datalink_log: data_dir.join(format!("{datalink_name}.log")),
            acklink_log: data_dir.join(format!("{acklink_name}.log")),
            datalink_name,
            acklink_name,
            flows: planned,
        }
    }

    pub fn flow(&self, tunnel_id: u32) -> Option<&FlowLogs> {
        self.flows.get(&tunnel_id)
    }

    /// Final merged log of `direction`
    pub fn final_log(&self, direction: Direction) -> &Path {
        match direction {
            Direction::Datalink => &self.datalink_log,
            Direction::Acklink => &self.acklink_log,
        }
    }

    /// Per-flow merged log of `direction`
    pub fn merged_flow_log(&self, tmp_dir: &Path, tunnel_id: u32, direction: Direction) -> Option<PathBuf> {
        let logs = self.flow(tunnel_id)?;
        let name = match direction {
            Direction::Datalink => &self.datalink_name,
            Direction::Acklink => &self.acklink_name,
        };
        Some(tmp_dir.join(format!("{name}_flow{tunnel_id}_uid{}.log.merged", logs.uid)))
    }
}
