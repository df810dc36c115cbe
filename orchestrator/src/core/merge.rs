//! Tunnel log merging
//!
//! Endpoint logs written by the tunnel client/server start with
//! `# init timestamp: <ms>` followed by one `<ts> - <uid> - <bytes>` line per
//! packet, timestamps relative to the init timestamp. A single merge pairs
//! the ingress and egress log of one flow and direction; a multiple merge
//! interleaves every flow's merged log (plus the emulated link's capacity
//! samples) into the final per-direction log.
//!
//! All outputs are sorted by timestamp with ties kept in input order, so the
//! same inputs always give byte-identical output.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::error::{OrchestratorError, OrchestratorResult};

const INIT_PREFIX: &str = "# init timestamp:";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Event {
    Capacity { bytes: u64 },
    Arrival { bytes: u64 },
    Departure { bytes: u64, delay: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Record {
    ts: f64,
    event: Event,
    flow: Option<u32>,
}

impl Record {
    fn render(&self, out: &mut String) {
        let _ = match self.event {
            Event::Capacity { bytes } => write!(out, "{:.3} # {}", self.ts, bytes),
            Event::Arrival { bytes } => write!(out, "{:.3} + {}", self.ts, bytes),
            Event::Departure { bytes, delay } => write!(out, "{:.3} - {} {:.3}", self.ts, bytes, delay),
        };
        if let Some(flow) = self.flow {
            let _ = write!(out, " {flow}");
        }
        out.push('\n');
    }
}

fn render(init_ts: f64, mut records: Vec<Record>) -> String {
    records.sort_by(|a, b| a.ts.total_cmp(&b.ts));

    let mut out = format!("{INIT_PREFIX} {init_ts:.3}\n");
    for record in &records {
        record.render(&mut out);
    }
    out
}

fn init_timestamp(text: &str, source: &str) -> OrchestratorResult<f64> {
    text.lines()
        .find_map(|line| line.strip_prefix(INIT_PREFIX))
        .ok_or_else(|| OrchestratorError::merge(format!("{source}: missing init timestamp (empty log?)")))?
        .trim()
        .parse::<f64>()
        .map_err(|e| OrchestratorError::merge(format!("{source}: bad init timestamp: {e}")))
}

fn data_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().filter(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with('#')
    })
}

fn bad_line(source: &str, line: &str) -> OrchestratorError {
    OrchestratorError::merge(format!("{source}: malformed line {line:?}"))
}

/// `<ts> - <uid> - <bytes>` (whitespace-separated also accepted)
fn parse_packet(line: &str, source: &str) -> OrchestratorResult<(f64, String, u64)> {
    let fields: Vec<&str> = line
        .split(|c: char| c == '-' || c.is_whitespace())
        .filter(|f| !f.is_empty())
        .collect();
    let [ts, uid, bytes] = fields[..] else {
        return Err(bad_line(source, line));
    };
    let ts = ts.parse::<f64>().map_err(|_| bad_line(source, line))?;
    let bytes = bytes.parse::<u64>().map_err(|_| bad_line(source, line))?;
    Ok((ts, uid.to_string(), bytes))
}

/// `<ts> <#|+|-> <bytes> [delay] [flow]`
fn parse_event(line: &str, source: &str) -> OrchestratorResult<(f64, Event)> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 3 {
        return Err(bad_line(source, line));
    }
    let ts = fields[0].parse::<f64>().map_err(|_| bad_line(source, line))?;
    let bytes = fields[2].parse::<u64>().map_err(|_| bad_line(source, line))?;
    let event = match fields[1] {
        "#" => Event::Capacity { bytes },
        "+" => Event::Arrival { bytes },
        "-" => {
            let delay = fields
                .get(3)
                .and_then(|d| d.parse::<f64>().ok())
                .ok_or_else(|| bad_line(source, line))?;
            Event::Departure { bytes, delay }
        }
        _ => return Err(bad_line(source, line)),
    };
    Ok((ts, event))
}

/// Merge one flow's ingress and egress log of one direction.
///
/// Each offset (ms) is added to its log's init timestamp before rebasing.
/// Departures of packets never seen on ingress are dropped.
pub fn merge_single(ingress: &str, egress: &str, ingress_offset: f64, egress_offset: f64) -> OrchestratorResult<String> {
    let ingress_init = init_timestamp(ingress, "ingress log")? + ingress_offset;
    let egress_init = init_timestamp(egress, "egress log")? + egress_offset;
    let base = ingress_init.min(egress_init);

    let mut records = Vec::new();
    let mut arrivals: HashMap<String, f64> = HashMap::new();

    for line in data_lines(ingress) {
        let (ts, uid, bytes) = parse_packet(line, "ingress log")?;
        let ts = ingress_init + ts - base;
        arrivals.insert(uid, ts);
        records.push(Record {
            ts,
            event: Event::Arrival { bytes },
            flow: None,
        });
    }

    for line in data_lines(egress) {
        let (ts, uid, bytes) = parse_packet(line, "egress log")?;
        let ts = egress_init + ts - base;
        if let Some(arrived) = arrivals.get(&uid) {
            records.push(Record {
                ts,
                event: Event::Departure {
                    bytes,
                    delay: ts - arrived,
                },
                flow: None,
            });
        }
    }

    Ok(render(base, records))
}

/// Merge per-flow merged logs (flow ids are 1-based positions in `flows`)
/// and the capacity samples of an optional link log.
pub fn merge_multiple(flows: &[String], link_log: Option<&str>) -> OrchestratorResult<String> {
    let mut inits = Vec::with_capacity(flows.len() + 1);
    for (index, text) in flows.iter().enumerate() {
        inits.push(init_timestamp(text, &format!("flow {} log", index + 1))?);
    }
    let link_init = link_log.map(|text| init_timestamp(text, "link log")).transpose()?;

    let base = inits
        .iter()
        .copied()
        .chain(link_init)
        .reduce(f64::min)
        .ok_or_else(|| OrchestratorError::merge("nothing to merge"))?;

    let mut records = Vec::new();

    if let (Some(text), Some(init)) = (link_log, link_init) {
        for line in data_lines(text) {
            let (ts, event) = parse_event(line, "link log")?;
            if let Event::Capacity { .. } = event {
                records.push(Record {
                    ts: init + ts - base,
                    event,
                    flow: None,
                });
            }
        }
    }

    for (index, (text, init)) in flows.iter().zip(&inits).enumerate() {
        let source = format!("flow {} log", index + 1);
        for line in data_lines(text) {
            let (ts, event) = parse_event(line, &source)?;
            if let Event::Capacity { .. } = event {
                continue;
            }
            records.push(Record {
                ts: init + ts - base,
                event,
                flow: Some(index as u32 + 1),
            });
        }
    }

    Ok(render(base, records))
}

async fn read_log(path: &Path) -> OrchestratorResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| OrchestratorError::merge(format!("cannot read {}: {e}", path.display())))
}

/// File-based [`merge_single`]
pub async fn merge_single_files(ingress: &Path, egress: &Path, offsets: (f64, f64), output: &Path) -> OrchestratorResult<()> {
    let merged = merge_single(&read_log(ingress).await?, &read_log(egress).await?, offsets.0, offsets.1)?;
    tokio::fs::write(output, merged).await?;
    Ok(())
}

/// File-based [`merge_multiple`]
pub async fn merge_multiple_files(flows: &[PathBuf], link_log: Option<&Path>, output: &Path) -> OrchestratorResult<()> {
    let mut texts = Vec::with_capacity(flows.len());
    for path in flows {
        texts.push(read_log(path).await?);
    }
    let link = match link_log {
        Some(path) => Some(read_log(path).await?),
        None => None,
    };

    let merged = merge_multiple(&texts, link.as_deref())?;
    tokio::fs::write(output, merged).await?;
    Ok(())
}
