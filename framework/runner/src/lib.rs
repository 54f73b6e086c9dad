mod cli;
mod clock;
mod completion;
mod config;
mod feed;
mod init;
mod monitor;
mod progress;
mod provision;
mod render;
mod run;
mod scoring;
mod shutdown;
mod status;
mod supervisor;
mod tool_path;
mod types;

pub mod prelude {
    pub use crate::cli::{HistoryArgs, RunArgs, SiegeCli, SiegeCommand};
    pub use crate::clock::{elapsed_secs, Clock, ManualClock, SystemClock};
    pub use crate::completion::{
        read_tail, CompletionDetector, CompletionMarker, CompletionSignal, Observation,
        DEFAULT_MARKER_WINDOW, DEFAULT_TAIL_BYTES,
    };
    pub use crate::config::RunConfiguration;
    pub use crate::feed::{spawn_status_feed, DEFAULT_POLL_INTERVAL};
    pub use crate::init::init;
    pub use crate::monitor::start_monitor;
    pub use crate::progress::start_progress;
    pub use crate::provision::{
        render_script, ProvisionedRun, ScriptProvisioner, TemplateProvisioner, LOG_FILE_NAME,
        METRICS_FILE_NAME, SCRIPT_FILE_NAME,
    };
    pub use crate::render::{history_table, print_report, report_table};
    pub use crate::run::{history, run};
    pub use crate::scoring::{
        compute_report, is_premature_stop, judge, Assessment, RunFacts, ScoreOverride, Verdict,
        VerdictRule, HIGH_LOAD_VUS, PREMATURE_TOLERANCE_SECS, SCORE_OVERRIDES, VERDICT_RULES,
    };
    pub use crate::status::RunStatus;
    pub use crate::supervisor::{
        RunContext, RunPhase, RunState, SharedSupervisor, Supervisor, SupervisorSettings,
        DEFAULT_GRACE_PERIOD, DEFAULT_STATUS_LINES,
    };
    pub use crate::tool_path::{k6_path, SIEGE_K6_PATH_ENV};
    pub use crate::types::SiegeResult;
}
