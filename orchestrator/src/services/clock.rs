//! Clock offsets against an NTP reference
//!
//! In cross-host runs each side's clock is compared with the same NTP host so
//! that remote-captured timestamps can be moved onto the local timeline.

use serde::{Deserialize, Serialize};
use shared::HostSide;

use crate::context::RemoteHost;
use crate::services::command;
use shared::{process_error, process_info, process_warn, ProcessId};

const NTP_ATTEMPTS: usize = 3;

/// Offsets of both hosts, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClockOffsets {
    pub local_ms: Option<f64>,
    pub remote_ms: Option<f64>,
}

/// Offsets to apply to each of the four endpoint logs of a flow
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinkOffsets {
    pub datalink_ingress: f64,
    pub datalink_egress: f64,
    pub acklink_ingress: f64,
    pub acklink_egress: f64,
}

impl ClockOffsets {
    /// Both offsets, when both were measured
    pub fn both(&self) -> Option<(f64, f64)> {
        self.local_ms.zip(self.remote_ms)
    }

    /// Per-log offsets given where the sender runs. `None` unless both
    /// hosts were measured.
    pub fn for_links(&self, sender_side: HostSide) -> Option<LinkOffsets> {
        let (local, remote) = self.both()?;
        Some(match sender_side {
            HostSide::Remote => LinkOffsets {
                datalink_egress: remote,
                acklink_ingress: remote,
                datalink_ingress: local,
                acklink_egress: local,
            },
            HostSide::Local => LinkOffsets {
                datalink_ingress: remote,
                acklink_egress: remote,
                datalink_egress: local,
                acklink_ingress: local,
            },
        })
    }
}

/// Offset in milliseconds from `ntpdate -quv` output: the second-to-last
/// token of the output, in seconds
pub fn parse_ntpdate_offset(output: &str) -> Option<f64> {
    let tokens: Vec<&str> = output.split_whitespace().collect();
    let token = tokens.len().checked_sub(2).map(|i| tokens[i])?;
    token.parse::<f64>().ok().map(|seconds| seconds * 1000.0)
}

fn ntpdate_argv(ntp_addr: &str) -> Vec<String> {
    ["ntpdate", "-t", "5", "-quv", ntp_addr]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Query one host's offset, retrying a few times
pub async fn query_offset(argv: &[String]) -> Option<f64> {
    for attempt in 1..=NTP_ATTEMPTS {
        match command::check_output(argv).await {
            Ok(output) => match parse_ntpdate_offset(&output) {
                Some(offset) => return Some(offset),
                None => {
                    process_warn!(
                        ProcessId::current(),
                        "Cannot convert clock offset to float (attempt {}): {}",
                        attempt,
                        output.trim()
                    );
                }
            },
            Err(e) => {
                process_warn!(ProcessId::current(), "Failed to get clock offset (attempt {}): {}", attempt, e);
            }
        }
    }
    process_error!(ProcessId::current(), "Failed after {} queries to NTP server", NTP_ATTEMPTS);
    None
}

/// Query local and remote offsets against `ntp_addr`
pub async fn query_clock_offsets(ntp_addr: &str, remote: &RemoteHost) -> ClockOffsets {
    let local_ms = query_offset(&ntpdate_argv(ntp_addr)).await;
    let remote_ms = query_offset(&remote.wrap(&ntpdate_argv(ntp_addr))).await;
    process_info!(
        ProcessId::current(),
        "Clock offsets: local {:?} ms, remote {:?} ms",
        local_ms,
        remote_ms
    );
    ClockOffsets { local_ms, remote_ms }
}
