use serde::{Deserialize, Serialize};
use std::str::FromStr;

mod history;

pub use history::{append_run_report, load_run_reports, HistoryRecorder, JsonlHistory};

/// Format used for [RunReport::timestamp].
pub const REPORT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What kind of run the load generator performs against the directory service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Sustained bind and search load from a pool of virtual users.
    #[default]
    #[display("load")]
    Load,
    /// A single pass probing for anonymous bind and RootDSE exposure.
    #[display("audit")]
    Audit,
}

impl RunMode {
    /// The scenario name the load generator reports progress under for this mode.
    pub fn scenario_name(&self) -> &'static str {
        match self {
            RunMode::Load => "stress_test",
            RunMode::Audit => "audit",
        }
    }
}

#[derive(derive_more::Error, derive_more::Display, Debug, Clone, PartialEq, Eq)]
#[display("Unknown run mode '{mode}', expected 'load' or 'audit'")]
pub struct UnknownModeError {
    mode: String,
}

impl FromStr for RunMode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "load" => Ok(RunMode::Load),
            "audit" => Ok(RunMode::Audit),
            _ => Err(UnknownModeError {
                mode: s.to_string(),
            }),
        }
    }
}

/// Qualitative verdict for a run, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
pub enum Score {
    A,
    B,
    C,
    D,
    F,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
pub enum LatencyBucket {
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
pub enum ErrorRateBucket {
    #[serde(rename = "<1%")]
    #[display("<1%")]
    Nominal,
    #[serde(rename = ">10% (Aborted)")]
    #[display(">10% (Aborted)")]
    Aborted,
}

/// How the run came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The load generator process exited on its own.
    #[display("process exit")]
    ProcessExit,
    /// The load generator logged its scenario completion line.
    #[display("completion marker")]
    CompletionMarker,
    /// An operator asked for the run to stop.
    #[display("manual stop")]
    ManualStop,
    /// The run was stopped without an operator asking, e.g. the status watcher went away.
    #[display("system stop")]
    SystemStop,
}

/// Derived figures shown alongside the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// The configured number of virtual users
    pub peak_vus: u32,
    /// `"<actual>s / <planned>s"`
    pub survival_time: String,
    pub avg_latency: LatencyBucket,
    pub error_rate: ErrorRateBucket,
}

/// The verdict for a single finished run.
///
/// Produced once per run. After that it is only ever cloned, never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique id chosen when the run was started
    pub run_id: String,
    /// One line human readable outcome
    pub summary: String,
    /// The directory service address that was tested
    pub target: String,
    pub mode: RunMode,
    /// Local time the report was computed, formatted with [REPORT_TIMESTAMP_FORMAT]
    pub timestamp: String,
    pub score: Score,
    pub ended_by: EndReason,
    pub stats: RunStats,
    /// Ordered, most important first
    pub recommendations: Vec<String>,
}
