//! Decides when a run is over, either because the load generator exited or because its log shows
//! the scenario reached 100%.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus};

use ldap_siege_report_model::{EndReason, RunMode};

/// How much of the end of the log is read on each poll.
pub const DEFAULT_TAIL_BYTES: u64 = 2000;

/// How many of the most recent non-blank lines are searched for the completion marker.
pub const DEFAULT_MARKER_WINDOW: usize = 5;

/// The line k6 prints when a named scenario has run to completion, e.g.
/// `stress_test ✓ [ 100% ] 10 VUs  30s`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionMarker {
    literal: String,
}

impl CompletionMarker {
    pub fn for_scenario(scenario_name: &str) -> Self {
        Self {
            literal: format!("{scenario_name} ✓ [ 100% ]"),
        }
    }

    pub fn for_mode(mode: RunMode) -> Self {
        Self::for_scenario(mode.scenario_name())
    }

    pub fn matches(&self, line: &str) -> bool {
        line.contains(&self.literal)
    }

    pub fn as_str(&self) -> &str {
        &self.literal
    }
}

/// The first signal that showed the run is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSignal {
    Exited(ExitStatus),
    Marker,
}

impl CompletionSignal {
    pub fn end_reason(&self) -> EndReason {
        match self {
            CompletionSignal::Exited(_) => EndReason::ProcessExit,
            CompletionSignal::Marker => EndReason::CompletionMarker,
        }
    }
}

/// The result of looking at the process and its log once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Non-blank lines from the end of the log, oldest first
    pub recent_lines: Vec<String>,
    pub signal: Option<CompletionSignal>,
}

/// Watches one run's process and log file.
#[derive(Debug, Clone)]
pub struct CompletionDetector {
    log_path: PathBuf,
    marker: CompletionMarker,
    tail_bytes: u64,
    marker_window: usize,
}

impl CompletionDetector {
    pub fn new(log_path: impl Into<PathBuf>, marker: CompletionMarker) -> Self {
        Self {
            log_path: log_path.into(),
            marker,
            tail_bytes: DEFAULT_TAIL_BYTES,
            marker_window: DEFAULT_MARKER_WINDOW,
        }
    }

    pub fn with_tail_bytes(mut self, tail_bytes: u64) -> Self {
        self.tail_bytes = tail_bytes;
        self
    }

    pub fn with_marker_window(mut self, marker_window: usize) -> Self {
        self.marker_window = marker_window;
        self
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Non-blocking check of the process followed by a bounded read of the log.
    ///
    /// Process exit wins over the marker when both are visible in the same poll.
    pub fn observe(&self, child: &mut Child) -> Observation {
        let exited = match child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                log::warn!("Failed to check load generator {}: {e}", child.id());
                None
            }
        };

        let recent_lines = self.tail();
        let signal = match exited {
            Some(status) => Some(CompletionSignal::Exited(status)),
            None if self.marker_seen(&recent_lines) => Some(CompletionSignal::Marker),
            None => None,
        };

        Observation {
            recent_lines,
            signal,
        }
    }

    /// The end of the log. Read failures are logged and give an empty tail.
    pub fn tail(&self) -> Vec<String> {
        match read_tail(&self.log_path, self.tail_bytes) {
            Ok(lines) => lines,
            Err(e) => {
                log::debug!("Could not tail '{}': {e}", self.log_path.display());
                Vec::new()
            }
        }
    }

    pub fn marker_seen(&self, lines: &[String]) -> bool {
        lines
            .iter()
            .rev()
            .take(self.marker_window)
            .any(|line| self.marker.matches(line))
    }
}

/// Read at most `max_bytes` from the end of `path` and split into non-blank lines.
///
/// When the read starts part way through a line, that partial first line is dropped.
pub fn read_tail(path: &Path, max_bytes: u64) -> std::io::Result<Vec<String>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let offset = len.saturating_sub(max_bytes);
    // One extra byte tells whether the window starts on a line boundary.
    let read_from = offset.saturating_sub(1);
    file.seek(SeekFrom::Start(read_from))?;

    let mut buf = Vec::with_capacity((len - read_from) as usize);
    file.take(max_bytes + (offset - read_from)).read_to_end(&mut buf)?;

    let starts_mid_line = offset > 0 && buf.first() != Some(&b'\n');
    let window = if offset > 0 { buf.get(1..).unwrap_or_default() } else { &buf[..] };

    let text = String::from_utf8_lossy(window);
    let mut lines = text.lines();
    if starts_mid_line {
        lines.next();
    }

    Ok(lines
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}

/// Keep only the last `count` lines.
pub fn last_lines(mut lines: Vec<String>, count: usize) -> Vec<String> {
    if lines.len() > count {
        lines.drain(..lines.len() - count);
    }
    lines
}
