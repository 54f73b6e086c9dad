use std::thread::JoinHandle;
use std::time::Duration;

use ldap_siege_core::prelude::DelegatedShutdownListener;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Share of all cores the load generator may use before the host is considered saturated.
const HIGH_CPU_PERCENT: f32 = 80.0;

/// Share of total memory the load generator may use before a warning.
const HIGH_MEMORY_PERCENT: f64 = 80.0;

/// Watch the load generator's resource usage and warn when it saturates the host.
///
/// A saturated generator measures itself rather than the directory service, so the verdict may be
/// misleading. This never stops the run. The thread exits on shutdown or once the process is gone.
pub fn start_monitor(
    pid: u32,
    mut shutdown_listener: DelegatedShutdownListener,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("monitor".to_string())
        .spawn(move || {
            let pid = Pid::from_u32(pid);
            let mut sys = System::new();

            sys.refresh_cpu_all();
            sys.refresh_memory();
            let cpu_count = sys.cpus().len().max(1);
            let total_memory = sys.total_memory();

            loop {
                if shutdown_listener.should_shutdown() {
                    break;
                }

                sys.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&[pid]),
                    true,
                    ProcessRefreshKind::nothing().with_cpu().with_memory(),
                );

                let Some(process) = sys.process(pid) else {
                    log::debug!("Load generator {pid} is gone, monitor exiting");
                    break;
                };

                let cpu = process.cpu_usage() / cpu_count as f32;
                if cpu > HIGH_CPU_PERCENT {
                    log::warn!(
                        "Load generator is using {cpu:.2}% of the CPU across {cpu_count} cores, results may reflect the test host rather than the target"
                    );
                }

                if total_memory > 0 {
                    let memory = process.memory() as f64 / total_memory as f64 * 100.0;
                    if memory > HIGH_MEMORY_PERCENT {
                        log::warn!("Load generator is using {memory:.2}% of system memory");
                    }
                }

                std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL.max(Duration::from_secs(1)));
            }
        })
}
