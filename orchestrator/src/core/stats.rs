//! Per-run stats file
//!
//! A run that succeeded leaves `Start at:` / `End at:` lines (and clock
//! offsets in cross-host mode). Downstream analysis annotates the file with
//! delimited sections; those lines are preserved across rewrites.

use std::path::{Path, PathBuf};

use crate::error::OrchestratorResult;
use crate::services::ClockOffsets;

const PRESERVED: [&str; 5] = [
    "Start at:",
    "End at:",
    "clock offset:",
    "Local clock offset:",
    "Remote clock offset:",
];

/// Free-text record accumulated during one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsRecord {
    pub start: Option<String>,
    pub end: Option<String>,
    pub offsets: Option<ClockOffsets>,
}

impl StatsRecord {
    pub fn render(&self) -> String {
        let mut text = String::new();
        if let (Some(start), Some(end)) = (&self.start, &self.end) {
            text.push_str(&format!("Start at: {start}\nEnd at: {end}\n"));
        }
        if let Some(offsets) = &self.offsets {
            if let Some(local) = offsets.local_ms {
                text.push_str(&format!("Local clock offset: {local} ms\n"));
            }
            if let Some(remote) = offsets.remote_ms {
                text.push_str(&format!("Remote clock offset: {remote} ms\n"));
            }
        }
        text
    }
}

/// Lines of an existing stats file that survive a rewrite
pub fn preserved_lines(text: &str) -> String {
    text.lines()
        .filter(|line| {
            let line = line.trim_start();
            PRESERVED.iter().any(|marker| line.starts_with(marker))
        })
        .map(|line| format!("{line}\n"))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsFile {
    path: PathBuf,
}

impl StatsFile {
    /// `<data_dir>/<name>_stats_run<N>.log`
    pub fn for_run(data_dir: &Path, name: &str, run_id: u32) -> Self {
        Self {
            path: data_dir.join(format!("{name}_stats_run{run_id}.log")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&self, record: &StatsRecord) -> OrchestratorResult<()> {
        tokio::fs::write(&self.path, record.render()).await?;
        Ok(())
    }

    /// Rewrite the file keeping the timing and offset lines, then append a
    /// `-- <section> --` delimited section
    pub async fn annotate(&self, section: &str, body: &str) -> OrchestratorResult<()> {
        let existing = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let mut text = preserved_lines(&existing);
        text.push_str(&format!("-- {section} --\n"));
        text.push_str(body.trim_end_matches('\n'));
        text.push('\n');
        text.push_str(&format!("-- {section} --\n"));

        tokio::fs::write(&self.path, text).await?;
        Ok(())
    }
}
