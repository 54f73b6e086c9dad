use std::time::Duration;

use anyhow::Context;
use ldap_siege_core::prelude::StopReason;
use ldap_siege_report_model::{load_run_reports, JsonlHistory, RunReport};

use crate::cli::{HistoryArgs, RunArgs};
use crate::feed::spawn_status_feed;
use crate::monitor::start_monitor;
use crate::progress::start_progress;
use crate::provision::TemplateProvisioner;
use crate::render::{history_table, print_report};
use crate::shutdown::start_shutdown_listener;
use crate::status::RunStatus;
use crate::supervisor::{SharedSupervisor, Supervisor};
use crate::tool_path::k6_path;
use crate::types::SiegeResult;

/// Run the load generator once, following it until it finishes or the operator interrupts it.
///
/// Returns the finalized report, or [None] if the run ended without one.
pub fn run(args: RunArgs) -> SiegeResult<Option<RunReport>> {
    let config = args.run_configuration();
    let k6 = k6_path()?;

    log::info!("Running {} against {}", config.mode, config.target);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime)?;

    let supervisor = Supervisor::new(
        k6,
        TemplateProvisioner::new(&args.results_dir),
        JsonlHistory::new(&args.history),
    )
    .into_shared();

    let pid = supervisor.lock().start(config.clone())?;

    // Ready to generate load so start watching for the generator saturating this host, which
    // would make the outcome misleading.
    let watchers = start_monitor(pid, shutdown_handle.new_listener())
        .context("Failed to start monitor")
        .and_then(|_| match (args.no_progress, config.planned_duration()) {
            (false, Some(planned_runtime)) => {
                start_progress(planned_runtime, shutdown_handle.new_listener())
                    .map(Some)
                    .context("Failed to start progress bar")
            }
            _ => Ok(None),
        });
    let progress = match stop_on_error(&supervisor, watchers) {
        Ok(progress) => progress,
        Err(e) => {
            shutdown_handle.shutdown(StopReason::RunComplete);
            return Err(e);
        }
    };

    runtime.block_on(async {
        let (mut statuses, feed) = spawn_status_feed(
            supervisor.clone(),
            Duration::from_millis(args.poll_interval_ms.max(1)),
            shutdown_handle.new_listener(),
        );

        let mut last_line: Option<String> = None;
        while let Some(status) = statuses.recv().await {
            if let Some(line) = status.recent_log_lines().last() {
                if last_line.as_ref() != Some(line) {
                    log::debug!(target: "k6", "{line}");
                    if let Some(progress) = &progress {
                        progress.set_message(line.clone());
                    }
                    last_line = Some(line.clone());
                }
            }

            if !matches!(status, RunStatus::Running { .. }) {
                log::info!("Run {status}");
            }
        }

        if let Err(e) = feed.await {
            log::error!("Status feed failed: {e:?}");
        }
    });

    // Let the progress bar and monitor know they can stop.
    shutdown_handle.shutdown(StopReason::RunComplete);

    let report = supervisor.lock().report().cloned();
    match &report {
        Some(report) => print_report(report),
        None => log::warn!("The run ended without a report"),
    }

    Ok(report)
}

/// Stop the active run if the setup around it failed, so no load generator is left orphaned.
fn stop_on_error<T>(supervisor: &SharedSupervisor, result: SiegeResult<T>) -> SiegeResult<T> {
    if let Err(e) = &result {
        log::error!("Stopping the run after a setup failure: {e:?}");
        if let Err(stop_err) = supervisor.lock().stop(false) {
            log::error!("Failed to stop the load generator: {stop_err:?}");
        }
    }
    result
}

/// Print previously recorded reports.
pub fn history(args: HistoryArgs) -> SiegeResult<()> {
    let reports = load_run_reports(&args.history)?;
    let shown = match args.last {
        Some(last) => &reports[reports.len().saturating_sub(last)..],
        None => &reports[..],
    };

    if shown.is_empty() {
        println!("No runs recorded in '{}'", args.history.display());
        return Ok(());
    }

    println!("{}", history_table(shown));
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt as _;

    use ldap_siege_report_model::{EndReason, RunMode};

    use super::*;
    use crate::config::RunConfiguration;

    #[test]
    fn setup_failure_stops_the_generator() {
        let dir = tempfile::tempdir().unwrap();
        let k6 = dir.path().join("fake-k6");
        std::fs::write(&k6, "#!/bin/sh\nPATH=/usr/bin:/bin\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&k6, std::fs::Permissions::from_mode(0o755)).unwrap();

        let supervisor = Supervisor::new(
            k6,
            TemplateProvisioner::new(dir.path().join("results")),
            JsonlHistory::new(dir.path().join("history.jsonl")),
        )
        .into_shared();
        supervisor
            .lock()
            .start(RunConfiguration::new("127.0.0.1", 1, "30s", RunMode::Load))
            .unwrap();

        let result: SiegeResult<()> =
            stop_on_error(&supervisor, Err(anyhow::anyhow!("monitor failed")));

        assert!(result.is_err());
        let mut supervisor = supervisor.lock();
        assert!(!supervisor.is_active());
        assert_eq!(
            supervisor.report().map(|report| report.ended_by),
            Some(EndReason::SystemStop)
        );
    }

    #[test]
    fn success_leaves_the_run_alone() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new(
            dir.path().join("no-such-k6"),
            TemplateProvisioner::new(dir.path().join("results")),
            JsonlHistory::new(dir.path().join("history.jsonl")),
        )
        .into_shared();

        assert_eq!(stop_on_error(&supervisor, Ok(7)).unwrap(), 7);
        assert!(supervisor.lock().report().is_none());
    }
}
