use anyhow::Context;
use ldap_siege_core::prelude::{ShutdownHandle, StopReason};
use tokio::signal;

/// Turn Ctrl-C into an operator interrupt on the returned handle.
pub(crate) fn start_shutdown_listener(
    runtime: &tokio::runtime::Runtime,
) -> anyhow::Result<ShutdownHandle> {
    let handle = ShutdownHandle::default();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        if let Err(e) = signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")
        {
            log::error!("{e:?}");
            return;
        }
        println!("Received shutdown signal, stopping the run...");
        listener_handle.shutdown(StopReason::Interrupted);
    });

    Ok(handle)
}
