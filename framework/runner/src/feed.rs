use std::time::Duration;

use ldap_siege_core::prelude::{DelegatedShutdownListener, StopReason};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::status::RunStatus;
use crate::supervisor::SharedSupervisor;

/// Default cadence for status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const STATUS_BUFFER: usize = 16;

/// Poll the supervisor on a fixed cadence and push each status to the returned receiver.
///
/// The feed ends after the first status that is not [RunStatus::Running], once a lingering load
/// generator has been given the chance to exit. If the receiver is dropped, or a shutdown is
/// requested, any still-active run is stopped so no load generator is left orphaned. An operator
/// interrupt counts as a manual stop, a vanished watcher does not.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_status_feed(
    supervisor: SharedSupervisor,
    interval: Duration,
    mut shutdown_listener: DelegatedShutdownListener,
) -> (mpsc::Receiver<RunStatus>, JoinHandle<()>) {
    let (sender, receiver) = mpsc::channel(STATUS_BUFFER);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                reason = shutdown_listener.wait_for_shutdown() => {
                    log::info!("Status feed shutting down: {reason}");
                    stop_if_active(&supervisor, reason == StopReason::Interrupted).await;
                    let _ = sender.send(poll(&supervisor).await).await;
                    break;
                }
                _ = sender.closed() => {
                    log::warn!("Status watcher went away, stopping any active run");
                    stop_if_active(&supervisor, false).await;
                    break;
                }
            }

            let status = poll(&supervisor).await;
            log::trace!("Polled status: {status}");
            let running = status.is_running();

            if sender.send(status).await.is_err() {
                log::warn!("Status watcher went away, stopping any active run");
                stop_if_active(&supervisor, false).await;
                break;
            }

            if !running {
                settle(&supervisor).await;
                break;
            }
        }

        log::debug!("Status feed finished");
    });

    (receiver, handle)
}

async fn poll(supervisor: &SharedSupervisor) -> RunStatus {
    let supervisor = supervisor.clone();
    match tokio::task::spawn_blocking(move || supervisor.lock().status()).await {
        Ok(status) => status,
        Err(e) => {
            log::error!("Status poll failed: {e:?}");
            RunStatus::Stopped
        }
    }
}

async fn stop_if_active(supervisor: &SharedSupervisor, manual: bool) {
    let supervisor = supervisor.clone();
    match tokio::task::spawn_blocking(move || supervisor.lock().stop(manual)).await {
        Ok(Ok(true)) => log::info!("Stopped the active run"),
        Ok(Ok(false)) => {}
        Ok(Err(e)) => log::error!("Failed to stop the active run: {e:?}"),
        Err(e) => log::error!("Stop task failed: {e:?}"),
    }
}

async fn settle(supervisor: &SharedSupervisor) {
    let supervisor = supervisor.clone();
    match tokio::task::spawn_blocking(move || supervisor.lock().settle()).await {
        Ok(Ok(Some(status))) => log::debug!("Load generator settled: {status}"),
        Ok(Ok(None)) => {}
        Ok(Err(e)) => log::error!("Failed to settle the load generator: {e:?}"),
        Err(e) => log::error!("Settle task failed: {e:?}"),
    }
}
