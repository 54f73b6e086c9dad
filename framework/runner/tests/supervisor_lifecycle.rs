#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use common::{
    load_config, poll_until_done, poll_until_logged, wait_until_exited, FailingHistory, Harness,
    StaticProvisioner, LOAD_MARKER_LINE,
};
use ldap_siege_core::prelude::AlreadyRunningError;
use ldap_siege_report_model::{EndReason, ErrorRateBucket, LatencyBucket, RunMode, Score};
use ldap_siege_runner::prelude::{
    RunConfiguration, RunPhase, RunStatus, Supervisor, SupervisorSettings,
};
use pretty_assertions::assert_eq;

#[test]
fn unexpected_exit_scores_f() {
    let harness = Harness::new();
    let mut supervisor = harness.supervisor("echo 'stress_test   [  33% ] 10 VUs  10.0s/30s'\nexit 1");

    supervisor.start(load_config(10, "30s")).expect("failed to start");
    harness.clock.advance_secs(10);

    let status = poll_until_done(&mut supervisor);
    assert!(matches!(status, RunStatus::Finished { .. }));

    let report = supervisor.report().expect("report after exit").clone();
    assert_eq!(report.score, Score::F);
    assert_eq!(report.ended_by, EndReason::ProcessExit);
    assert!(report
        .recommendations
        .iter()
        .any(|r| r.contains("collapsed after 10 seconds")));
    assert_eq!(report.stats.avg_latency, LatencyBucket::High);
    assert_eq!(report.stats.error_rate, ErrorRateBucket::Aborted);
    assert_eq!(report.stats.survival_time, "10s / 30s");

    assert_eq!(supervisor.status(), RunStatus::Stopped);
    assert_eq!(harness.history.reports(), vec![report]);
}

#[test]
fn manual_stop_scores_b() {
    let harness = Harness::new();
    let mut supervisor = harness.supervisor("exec sleep 30");

    supervisor.start(load_config(10, "30s")).expect("failed to start");
    assert!(supervisor.is_active());
    harness.clock.advance_secs(12);

    assert!(supervisor.stop(true).expect("failed to stop"));
    assert!(!supervisor.is_active());

    let report = supervisor.report().expect("report after stop").clone();
    assert_eq!(report.score, Score::B);
    assert!(report.summary.contains("12s"));
    assert_eq!(report.recommendations.len(), 1);
    assert!(report.recommendations[0].contains("stopped by the user"));
    assert_eq!(report.ended_by, EndReason::ManualStop);

    let state = supervisor.state();
    assert!(state.manual_stop());
    assert!(state.started_at().is_none());
    assert!(state.report_started_at().is_some());
    assert_eq!(state.phase(), RunPhase::Finished);

    assert_eq!(supervisor.status(), RunStatus::Stopped);
    assert!(!supervisor.stop(true).expect("second stop"));
    assert_eq!(harness.history.reports().len(), 1);
}

#[test]
fn running_status_reports_pid_and_elapsed() {
    let harness = Harness::new();
    let mut supervisor = harness.supervisor("echo 'stress_test   [   1% ] 10 VUs'\nexec sleep 30");

    let pid = supervisor.start(load_config(10, "30s")).expect("failed to start");
    poll_until_logged(&mut supervisor, "[   1% ]");
    harness.clock.advance_secs(7);

    match supervisor.status() {
        RunStatus::Running {
            pid: status_pid,
            elapsed_seconds,
            recent_log_lines,
        } => {
            assert_eq!(status_pid, pid);
            assert_eq!(elapsed_seconds, 7);
            assert_eq!(recent_log_lines, vec!["stress_test   [   1% ] 10 VUs"]);
        }
        other => panic!("expected running, got {other:?}"),
    }
    assert!(supervisor.report().is_none());

    supervisor.stop(true).expect("failed to stop");
}

#[test]
fn log_marker_finishes_before_exit() {
    let harness = Harness::new();
    let mut supervisor = harness.supervisor(&format!(
        "echo 'stress_test   [  99% ] 10 VUs  29.7s/30s'\necho '{LOAD_MARKER_LINE}'\nsleep 3\necho 'data_received: 1.2 MB'\nexit 0"
    ));

    supervisor.start(load_config(10, "30s")).expect("failed to start");
    harness.clock.advance_secs(30);

    let status = poll_until_done(&mut supervisor);
    let RunStatus::Finished { recent_log_lines } = status else {
        panic!("expected finished, got {status:?}");
    };
    assert!(recent_log_lines.iter().any(|line| line == LOAD_MARKER_LINE));

    // Finalized from the log alone, the process is still winding down.
    assert!(supervisor.is_active());
    let report = supervisor.report().expect("report after marker").clone();
    assert_eq!(report.ended_by, EndReason::CompletionMarker);
    assert_eq!(report.score, Score::A);
    let serialized = serde_json::to_string(&report).unwrap();

    harness.clock.advance_secs(5);
    wait_until_exited(&mut supervisor);
    assert!(matches!(supervisor.status(), RunStatus::Finished { .. }));
    assert_eq!(supervisor.status(), RunStatus::Stopped);

    let after = supervisor.report().expect("report is kept");
    assert_eq!(serde_json::to_string(after).unwrap(), serialized);
    assert_eq!(harness.history.reports(), vec![report]);
}

#[test]
fn generator_has_its_own_process_group() {
    use nix::unistd::{getpgid, getpgrp, Pid};

    let harness = Harness::new();
    let mut supervisor = harness.supervisor("exec sleep 30");

    let pid = supervisor.start(load_config(10, "30s")).expect("failed to start");
    let child = Pid::from_raw(pid as i32);
    let child_group = getpgid(Some(child)).expect("failed to read child process group");

    assert_eq!(child_group, child);
    assert_ne!(child_group, getpgrp());

    harness.clock.advance_secs(12);
    assert!(supervisor.stop(true).expect("failed to stop"));
    let report = supervisor.report().expect("report after stop");
    assert_eq!(report.score, Score::B);
    assert_eq!(report.ended_by, EndReason::ManualStop);
}

#[test]
fn starting_twice_fails() {
    let harness = Harness::new();
    let mut supervisor = harness.supervisor("exec sleep 30");

    let pid = supervisor.start(load_config(10, "30s")).expect("failed to start");
    let err = supervisor
        .start(load_config(10, "30s"))
        .expect_err("second start should fail");
    let already = err
        .downcast_ref::<AlreadyRunningError>()
        .expect("AlreadyRunningError");
    assert_eq!(already.pid(), pid);

    // The first run is untouched.
    assert!(supervisor.is_active());
    assert_eq!(supervisor.state().phase(), RunPhase::Active);

    supervisor.stop(true).expect("failed to stop");
}

#[test]
fn unresponsive_generator_is_killed_after_grace() {
    let harness = Harness::new();
    let settings = SupervisorSettings {
        grace_period: Duration::from_millis(200),
        ..SupervisorSettings::default()
    };
    let mut supervisor = harness.supervisor_with_settings(
        "trap '' TERM\necho ready\nwhile true; do sleep 1; done",
        settings,
    );

    supervisor.start(load_config(10, "30s")).expect("failed to start");
    poll_until_logged(&mut supervisor, "ready");
    harness.clock.advance_secs(30);

    let started = Instant::now();
    assert!(supervisor.stop(false).expect("failed to stop"));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!supervisor.is_active());

    let report = supervisor.report().expect("report after stop");
    assert_eq!(report.ended_by, EndReason::SystemStop);
    assert_eq!(report.score, Score::A);
}

#[test]
fn system_stop_before_plan_is_premature() {
    let harness = Harness::new();
    let mut supervisor = harness.supervisor("exec sleep 30");

    supervisor.start(load_config(10, "30s")).expect("failed to start");
    harness.clock.advance_secs(24);
    supervisor.stop(false).expect("failed to stop");

    let report = supervisor.report().expect("report after stop");
    assert_eq!(report.score, Score::F);
    assert!(!supervisor.state().manual_stop());
}

#[test]
fn start_finalizes_an_unobserved_exit() {
    let harness = Harness::new();
    let mut supervisor = harness.supervisor("exit 0");

    supervisor.start(load_config(10, "30s")).expect("failed to start");
    harness.clock.advance_secs(30);
    wait_until_exited(&mut supervisor);

    supervisor
        .start(load_config(10, "30s"))
        .expect("restart after exit");

    let reports = harness.history.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].run_id, "run-0");
    assert_eq!(reports[0].score, Score::A);

    // The new run starts clean.
    assert!(supervisor.report().is_none());
    assert_eq!(supervisor.state().phase(), RunPhase::Active);
    assert!(!supervisor.state().manual_stop());

    harness.clock.advance_secs(30);
    poll_until_done(&mut supervisor);
    let reports = harness.history.reports();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[1].run_id, "run-1");
}

#[test]
fn audit_run_is_overridden_to_d() {
    let harness = Harness::new();
    let mut supervisor = harness.supervisor("exit 0");
    let config = RunConfiguration::new("127.0.0.1", 5, "10s", RunMode::Audit);

    supervisor.start(config).expect("failed to start");
    harness.clock.advance_secs(10);
    poll_until_done(&mut supervisor);

    let report = supervisor.report().expect("report after exit");
    assert_eq!(report.score, Score::D);
    assert_eq!(
        report.recommendations,
        vec![
            "Server healthy. No premature failures detected.",
            "Audit Found: Anonymous Bind Enabled (Security Risk).",
        ]
    );
}

#[test]
fn history_failure_does_not_break_finalization() {
    let harness = Harness::new();
    let mut supervisor = Supervisor::new(
        harness.fake_k6("exit 0"),
        StaticProvisioner::new(&harness.dir.path().join("results")),
        FailingHistory,
    )
    .with_clock(harness.clock.clone());

    supervisor.start(load_config(10, "30s")).expect("failed to start");
    harness.clock.advance_secs(30);

    assert!(matches!(
        poll_until_done(&mut supervisor),
        RunStatus::Finished { .. }
    ));
    assert_eq!(supervisor.report().map(|r| r.score), Some(Score::A));
    assert_eq!(supervisor.status(), RunStatus::Stopped);
}

#[test]
fn missing_binary_fails_to_start() {
    let harness = Harness::new();
    let mut supervisor = Supervisor::new(
        harness.dir.path().join("no-such-k6"),
        StaticProvisioner::new(&harness.dir.path().join("results")),
        harness.history.clone(),
    );

    assert!(supervisor.start(load_config(10, "30s")).is_err());
    assert_eq!(supervisor.state().phase(), RunPhase::Idle);
    assert_eq!(supervisor.status(), RunStatus::Stopped);
    assert!(harness.history.reports().is_empty());
}

#[test]
fn generator_receives_script_and_metrics_paths() {
    let harness = Harness::new();
    let mut supervisor = harness.supervisor("echo \"args: $*\"\nexit 0");

    supervisor.start(load_config(10, "30s")).expect("failed to start");
    harness.clock.advance_secs(30);
    let RunStatus::Finished { recent_log_lines } = poll_until_done(&mut supervisor) else {
        panic!("expected finished");
    };

    let run = supervisor.state().run().expect("run context");
    let expected = format!(
        "args: run --out json={} {}",
        run.provisioned.metrics_path.display(),
        run.provisioned.script_path.display()
    );
    assert_eq!(recent_log_lines, vec![expected]);
}
