#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, TimeZone};
use ldap_siege_report_model::{HistoryRecorder, RunReport};
use ldap_siege_runner::prelude::{
    ManualClock, ProvisionedRun, RunConfiguration, RunStatus, ScriptProvisioner, SiegeResult,
    Supervisor, SupervisorSettings,
};
use parking_lot::Mutex;
use tempfile::TempDir;

pub const LOAD_MARKER_LINE: &str = "stress_test ✓ [ 100% ] 10 VUs  30s";

/// Lays out `run-<n>` directories under a root without rendering any script.
pub struct StaticProvisioner {
    root: PathBuf,
    runs: AtomicUsize,
}

impl StaticProvisioner {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            runs: AtomicUsize::new(0),
        }
    }
}

impl ScriptProvisioner for StaticProvisioner {
    fn provision(&self, _config: &RunConfiguration) -> SiegeResult<ProvisionedRun> {
        let run_id = format!("run-{}", self.runs.fetch_add(1, Ordering::SeqCst));
        let run = ProvisionedRun::in_dir(run_id.clone(), self.root.join(&run_id));
        std::fs::create_dir_all(&run.output_dir)?;
        std::fs::write(&run.script_path, "// unused by the fake generator\n")?;
        Ok(run)
    }
}

/// Keeps every appended report so tests can count side effects.
#[derive(Clone, Default)]
pub struct RecordingHistory {
    reports: Arc<Mutex<Vec<RunReport>>>,
}

impl RecordingHistory {
    pub fn reports(&self) -> Vec<RunReport> {
        self.reports.lock().clone()
    }
}

impl HistoryRecorder for RecordingHistory {
    fn append(&self, report: &RunReport) -> anyhow::Result<()> {
        self.reports.lock().push(report.clone());
        Ok(())
    }
}

pub struct FailingHistory;

impl HistoryRecorder for FailingHistory {
    fn append(&self, _report: &RunReport) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub clock: ManualClock,
    pub history: RecordingHistory,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create temp dir"),
            clock: ManualClock::new(
                Local
                    .with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
                    .single()
                    .expect("unambiguous local time"),
            ),
            history: RecordingHistory::default(),
        }
    }

    /// Write a `/bin/sh` script standing in for k6. It ignores its arguments.
    pub fn fake_k6(&self, body: &str) -> PathBuf {
        let path = self.dir.path().join("fake-k6");
        std::fs::write(&path, format!("#!/bin/sh\nPATH=/usr/bin:/bin\n{body}\n"))
            .expect("failed to write fake k6");
        let mut perms = std::fs::metadata(&path)
            .expect("failed to read fake k6 metadata")
            .permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).expect("failed to make fake k6 executable");
        path
    }

    pub fn supervisor(&self, body: &str) -> Supervisor {
        self.supervisor_with_settings(body, SupervisorSettings::default())
    }

    pub fn supervisor_with_settings(&self, body: &str, settings: SupervisorSettings) -> Supervisor {
        Supervisor::new(
            self.fake_k6(body),
            StaticProvisioner::new(&self.dir.path().join("results")),
            self.history.clone(),
        )
        .with_clock(self.clock.clone())
        .with_settings(settings)
    }
}

pub fn load_config(vus: u32, duration: &str) -> RunConfiguration {
    RunConfiguration::new(
        "127.0.0.1",
        vus,
        duration,
        ldap_siege_report_model::RunMode::Load,
    )
}

/// Poll until the status is no longer running.
pub fn poll_until_done(supervisor: &mut Supervisor) -> RunStatus {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let status = supervisor.status();
        if !status.is_running() {
            return status;
        }
        assert!(Instant::now() < deadline, "run did not finish in time");
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Poll until the latest log lines contain `needle`.
pub fn poll_until_logged(supervisor: &mut Supervisor, needle: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let status = supervisor.status();
        if status.recent_log_lines().iter().any(|line| line.contains(needle)) {
            return;
        }
        assert!(Instant::now() < deadline, "'{needle}' never appeared in the log");
        std::thread::sleep(Duration::from_millis(20));
    }
}

pub fn wait_until_exited(supervisor: &mut Supervisor) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while supervisor.is_active() {
        assert!(Instant::now() < deadline, "load generator did not exit in time");
        std::thread::sleep(Duration::from_millis(20));
    }
}
