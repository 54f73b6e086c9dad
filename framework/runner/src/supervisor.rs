//! Owns the single external load generator run: starting it, answering status polls, stopping it
//! and finalizing its report exactly once.

use std::fs::File;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{DateTime, Local};
use ldap_siege_core::prelude::AlreadyRunningError;
use ldap_siege_report_model::{EndReason, HistoryRecorder, RunReport};
use parking_lot::Mutex;

use crate::clock::{elapsed_secs, Clock, SystemClock};
use crate::completion::{
    last_lines, CompletionDetector, CompletionMarker, CompletionSignal, DEFAULT_MARKER_WINDOW,
    DEFAULT_TAIL_BYTES,
};
use crate::config::RunConfiguration;
use crate::provision::{ProvisionedRun, ScriptProvisioner};
use crate::scoring::{compute_report, RunFacts};
use crate::status::RunStatus;
use crate::types::SiegeResult;

/// How long the load generator gets to flush its metrics after being asked to stop.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Number of log lines returned with each status.
pub const DEFAULT_STATUS_LINES: usize = 10;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A supervisor shared between the status feed and whoever issues commands. Every mutating call
/// goes through the one lock.
pub type SharedSupervisor = Arc<Mutex<Supervisor>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    pub grace_period: Duration,
    pub tail_bytes: u64,
    pub marker_window: usize,
    pub status_lines: usize,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            tail_bytes: DEFAULT_TAIL_BYTES,
            marker_window: DEFAULT_MARKER_WINDOW,
            status_lines: DEFAULT_STATUS_LINES,
        }
    }
}

/// Where a run is in its lifecycle.
///
/// `Active -> Finalizing -> Finished` happens at most once per run, whichever completion signal
/// arrives first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, derive_more::Display)]
pub enum RunPhase {
    #[default]
    #[display("idle")]
    Idle,
    #[display("active")]
    Active,
    #[display("finalizing")]
    Finalizing,
    #[display("finished")]
    Finished,
}

/// The run that was most recently started.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: RunConfiguration,
    pub provisioned: ProvisionedRun,
    detector: CompletionDetector,
}

/// Mutable state of the current run, only ever touched through the [Supervisor].
#[derive(Debug, Default)]
pub struct RunState {
    phase: RunPhase,
    child: Option<Child>,
    run: Option<RunContext>,
    started_at: Option<DateTime<Local>>,
    report_started_at: Option<DateTime<Local>>,
    manual_stop: bool,
    report: Option<RunReport>,
}

impl RunState {
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn run(&self) -> Option<&RunContext> {
        self.run.as_ref()
    }

    /// Set while the run is live, cleared when it is finalized.
    pub fn started_at(&self) -> Option<DateTime<Local>> {
        self.started_at
    }

    pub fn report_started_at(&self) -> Option<DateTime<Local>> {
        self.report_started_at
    }

    pub fn manual_stop(&self) -> bool {
        self.manual_stop
    }

    pub fn is_finalized(&self) -> bool {
        self.phase == RunPhase::Finished
    }

    pub fn report(&self) -> Option<&RunReport> {
        self.report.as_ref()
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }
}

pub struct Supervisor {
    k6_path: PathBuf,
    provisioner: Box<dyn ScriptProvisioner>,
    history: Box<dyn HistoryRecorder>,
    clock: Arc<dyn Clock>,
    settings: SupervisorSettings,
    state: RunState,
}

impl Supervisor {
    pub fn new(
        k6_path: impl Into<PathBuf>,
        provisioner: impl ScriptProvisioner + 'static,
        history: impl HistoryRecorder + 'static,
    ) -> Self {
        Self {
            k6_path: k6_path.into(),
            provisioner: Box::new(provisioner),
            history: Box::new(history),
            clock: Arc::new(SystemClock),
            settings: SupervisorSettings::default(),
            state: RunState::default(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_settings(mut self, settings: SupervisorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn into_shared(self) -> SharedSupervisor {
        Arc::new(Mutex::new(self))
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// The finalized report of the latest run, [None] until a run has finished.
    pub fn report(&self) -> Option<&RunReport> {
        self.state.report.as_ref()
    }

    /// True while a load generator process exists and has not exited.
    ///
    /// Checking a child for exit needs `&mut`, but no run state changes here.
    pub fn is_active(&mut self) -> bool {
        self.active_pid().is_some()
    }

    fn active_pid(&mut self) -> Option<u32> {
        let child = self.state.child.as_mut()?;
        match child.try_wait() {
            Ok(None) => Some(child.id()),
            Ok(Some(_)) => None,
            Err(e) => {
                // Can't tell, so assume it is still there rather than risk two generators.
                log::warn!("Failed to check load generator {}: {e}", child.id());
                Some(child.id())
            }
        }
    }

    /// Start a new run and return the load generator's process id.
    ///
    /// Fails with [AlreadyRunningError] if the previous load generator is still alive.
    pub fn start(&mut self, config: RunConfiguration) -> SiegeResult<u32> {
        if let Some(pid) = self.active_pid() {
            return Err(AlreadyRunningError::new(pid).into());
        }

        if self.state.phase == RunPhase::Active {
            log::info!("Previous run exited without being observed, finalizing it first");
            self.status();
        }

        self.state = RunState {
            started_at: Some(self.clock.now()),
            ..RunState::default()
        };

        match self.launch(&config) {
            Ok((child, provisioned)) => {
                let pid = child.id();
                log::info!(
                    "Started {} run {} against {} with {} VUs for {} (pid {pid})",
                    config.mode,
                    provisioned.run_id,
                    config.target,
                    config.vus,
                    config.duration
                );

                let detector = CompletionDetector::new(
                    &provisioned.log_path,
                    CompletionMarker::for_mode(config.mode),
                )
                .with_tail_bytes(self.settings.tail_bytes)
                .with_marker_window(self.settings.marker_window);

                self.state.child = Some(child);
                self.state.run = Some(RunContext {
                    config,
                    provisioned,
                    detector,
                });
                self.state.phase = RunPhase::Active;
                Ok(pid)
            }
            Err(e) => {
                self.state = RunState::default();
                Err(e)
            }
        }
    }

    fn launch(&self, config: &RunConfiguration) -> SiegeResult<(Child, ProvisionedRun)> {
        let provisioned = self
            .provisioner
            .provision(config)
            .context("Failed to provision the run")?;

        let log_file = File::create(&provisioned.log_path).with_context(|| {
            format!(
                "Failed to create run log '{}'",
                provisioned.log_path.display()
            )
        })?;
        let stderr = log_file
            .try_clone()
            .context("Failed to share the run log between stdout and stderr")?;

        log::debug!(
            "Launching '{}' with script '{}'",
            self.k6_path.display(),
            provisioned.script_path.display()
        );
        let mut command = Command::new(&self.k6_path);
        // Terminal signals must not reach the generator, only `stop` ends it.
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);

        let child = command
            .arg("run")
            .arg("--out")
            .arg(format!("json={}", provisioned.metrics_path.display()))
            .arg(&provisioned.script_path)
            .current_dir(&provisioned.output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(stderr))
            .spawn()
            .with_context(|| format!("Failed to run '{}'", self.k6_path.display()))?;

        Ok((child, provisioned))
    }

    /// Stop the running load generator.
    ///
    /// Returns `false` if nothing was running. Otherwise asks the process to exit, waits up to the
    /// grace period, kills it if needed and finalizes the run.
    pub fn stop(&mut self, manual: bool) -> SiegeResult<bool> {
        if !self.is_active() {
            return Ok(false);
        }
        let Some(mut child) = self.state.child.take() else {
            return Ok(false);
        };

        if self.state.phase == RunPhase::Active {
            self.state.manual_stop = manual;
        }

        let pid = child.id();
        match terminate(&mut child, self.settings.grace_period) {
            Ok(status) => log::info!("Load generator {pid} stopped: {status}"),
            Err(e) => {
                self.state.child = Some(child);
                return Err(e);
            }
        }

        let reason = if manual {
            EndReason::ManualStop
        } else {
            EndReason::SystemStop
        };
        self.finalize(reason)?;
        Ok(true)
    }

    /// Observe the run once. Never blocks on the load generator.
    ///
    /// Finalizes the run the first time either completion signal is seen.
    pub fn status(&mut self) -> RunStatus {
        match self.state.phase {
            RunPhase::Active => self.poll_active(),
            RunPhase::Finalizing | RunPhase::Finished if self.state.child.is_some() => {
                self.poll_lingering()
            }
            _ => RunStatus::Stopped,
        }
    }

    fn poll_active(&mut self) -> RunStatus {
        let (pid, observation) = match (self.state.child.as_mut(), self.state.run.as_ref()) {
            (Some(child), Some(run)) => (child.id(), run.detector.observe(child)),
            _ => {
                log::warn!("Run marked active without a load generator, treating it as stopped");
                return RunStatus::Stopped;
            }
        };
        let recent_log_lines = last_lines(observation.recent_lines, self.settings.status_lines);

        let Some(signal) = observation.signal else {
            let elapsed_seconds = self
                .state
                .started_at
                .map(|started_at| elapsed_secs(started_at, self.clock.now()))
                .unwrap_or_default();
            return RunStatus::Running {
                pid,
                elapsed_seconds,
                recent_log_lines,
            };
        };

        match signal {
            CompletionSignal::Exited(status) => {
                log::info!("Load generator {pid} exited: {status}");
                self.state.child = None;
            }
            CompletionSignal::Marker => {
                log::info!("Load generator {pid} reported scenario completion");
            }
        }

        if let Err(e) = self.finalize(signal.end_reason()) {
            log::error!("Failed to finalize run: {e:?}");
        }

        RunStatus::Finished { recent_log_lines }
    }

    /// The run is finalized but its process was still alive last time we looked.
    fn poll_lingering(&mut self) -> RunStatus {
        let recent_log_lines = self
            .state
            .run
            .as_ref()
            .map(|run| last_lines(run.detector.tail(), self.settings.status_lines))
            .unwrap_or_default();

        if let Some(child) = self.state.child.as_mut() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    log::debug!("Load generator {} exited after completion: {status}", child.id());
                    self.state.child = None;
                }
                Ok(None) => {}
                Err(e) => log::warn!("Failed to check load generator {}: {e}", child.id()),
            }
        }

        RunStatus::Finished { recent_log_lines }
    }

    /// Give a finished run's process the grace period to exit by itself, then stop it.
    ///
    /// Does nothing unless the run is finalized and its process is still around.
    pub fn settle(&mut self) -> SiegeResult<Option<ExitStatus>> {
        if self.state.phase != RunPhase::Finished {
            return Ok(None);
        }
        let Some(child) = self.state.child.as_mut() else {
            return Ok(None);
        };

        let exited = wait_for_exit(child, self.settings.grace_period)?;
        let status = match exited {
            Some(status) => status,
            None => {
                log::warn!(
                    "Load generator {} still running after completion, stopping it",
                    child.id()
                );
                terminate(child, self.settings.grace_period)?
            }
        };
        self.state.child = None;
        Ok(Some(status))
    }

    /// Move the run to finished, compute its report and record it in the history.
    ///
    /// Only the first call for a run does anything.
    fn finalize(&mut self, ended_by: EndReason) -> SiegeResult<()> {
        if self.state.phase != RunPhase::Active {
            log::debug!(
                "Run is {}, ignoring completion by {ended_by}",
                self.state.phase
            );
            return Ok(());
        }
        self.state.phase = RunPhase::Finalizing;

        let completed_at = self.clock.now();
        self.state.report_started_at = self.state.started_at.take();

        let result = match self.state.run.as_ref() {
            Some(run) => {
                let facts = RunFacts {
                    run_id: run.provisioned.run_id.clone(),
                    report_started_at: self.state.report_started_at,
                    completed_at,
                    manual_stop: self.state.manual_stop,
                    ended_by,
                };
                compute_report(&run.config, &facts).map_err(anyhow::Error::from)
            }
            None => Err(anyhow::anyhow!("No run configuration to report on")),
        };
        self.state.phase = RunPhase::Finished;
        let report = result?;

        log::info!(
            "Run {} finished by {ended_by}: score {} ({})",
            report.run_id,
            report.score,
            report.summary
        );

        if let Err(e) = self.history.append(&report) {
            log::error!("Failed to record run {} in history: {e:?}", report.run_id);
        }
        self.state.report = Some(report);

        Ok(())
    }
}

/// Wait up to `timeout` for the child to exit by itself.
fn wait_for_exit(child: &mut Child, timeout: Duration) -> SiegeResult<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child
            .try_wait()
            .context("Failed to check load generator")?
        {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        std::thread::sleep(EXIT_POLL_INTERVAL);
    }
}

/// Ask the child to exit, then kill it if it is still running after `grace_period`.
fn terminate(child: &mut Child, grace_period: Duration) -> SiegeResult<ExitStatus> {
    if request_graceful_exit(child) {
        if let Some(status) = wait_for_exit(child, grace_period)? {
            return Ok(status);
        }
        log::warn!(
            "Load generator {} did not exit within {grace_period:?}, killing it",
            child.id()
        );
    }

    child.kill().context("Failed to kill load generator")?;
    child.wait().context("Failed to reap load generator")
}

#[cfg(unix)]
fn request_graceful_exit(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Failed to send SIGTERM to load generator {}: {e}", child.id());
            false
        }
    }
}

#[cfg(not(unix))]
fn request_graceful_exit(_child: &Child) -> bool {
    false
}
