use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::RunReport;

/// Durable log of finalized run reports.
///
/// Called exactly once per finalized run. Implementations may fail, the caller logs the failure and
/// carries on so that a broken history never affects the in-memory run state.
pub trait HistoryRecorder: Send {
    fn append(&self, report: &RunReport) -> anyhow::Result<()>;
}

/// A [HistoryRecorder] that writes one JSON object per line.
///
/// The recommended file extension is `.jsonl`. Parent directories are created on first write.
#[derive(Debug, Clone)]
pub struct JsonlHistory {
    path: PathBuf,
}

impl JsonlHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryRecorder for JsonlHistory {
    fn append(&self, report: &RunReport) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create history directory '{}'", parent.display())
            })?;
        }

        append_run_report(report, &self.path)?;
        log::debug!(
            "Appended report for run {} to '{}'",
            report.run_id,
            self.path.display()
        );
        Ok(())
    }
}

/// Append the report to a file as a single line of JSON followed by a newline.
pub fn append_run_report(report: &RunReport, path: &Path) -> anyhow::Result<()> {
    let mut line = serde_json::to_vec(report).context("Failed to serialize run report")?;
    line.push(b'\n');

    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("Failed to open history file '{}'", path.display()))?;
    // One write per report keeps lines whole if another process appends to the same file.
    file.write_all(&line)
        .with_context(|| format!("Failed to append to history file '{}'", path.display()))?;
    Ok(())
}

/// Load every report from a file written by [append_run_report].
///
/// Blank lines are skipped. Any malformed line fails the whole load.
pub fn load_run_reports(path: &Path) -> anyhow::Result<Vec<RunReport>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open history file '{}'", path.display()))?;
    let reader = std::io::BufReader::new(file);
    let mut reports = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let report: RunReport = serde_json::from_str(&line)
            .with_context(|| format!("Malformed report on line {}", index + 1))?;
        reports.push(report);
    }
    Ok(reports)
}
