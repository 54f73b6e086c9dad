use std::cmp::min;
use std::fmt::Write;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use ldap_siege_core::prelude::DelegatedShutdownListener;

/// Show a progress bar for the planned duration of the run.
///
/// The returned bar can be given a message, the latest load generator line is a good fit. The bar
/// is cleared once a shutdown is signalled.
pub fn start_progress(
    planned_runtime: Duration,
    mut shutdown_listener: DelegatedShutdownListener,
) -> std::io::Result<ProgressBar> {
    let pb = ProgressBar::new(planned_runtime.as_secs());
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{wide_bar:.cyan/blue}] [{elapsed_precise} / {planned_runtime}] {msg}",
    )
    .map_err(std::io::Error::other)?
    .with_key("planned_runtime", {
        let hours = planned_runtime.as_secs() / 3600;
        let minutes = (planned_runtime.as_secs() % 3600) / 60;
        let seconds = planned_runtime.as_secs() % 60;
        move |_state: &ProgressState, w: &mut dyn Write| {
            let _ = write!(w, "{hours:02}:{minutes:02}:{seconds:02}");
        }
    })
    .progress_chars("#>-");
    pb.set_style(style);

    let bar = pb.clone();
    std::thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || {
            let start_time = Instant::now();
            loop {
                if shutdown_listener.should_shutdown() {
                    log::trace!("Progress thread shutting down");
                    bar.finish_and_clear();
                    break;
                }

                let new = min(start_time.elapsed().as_secs(), planned_runtime.as_secs());
                bar.set_position(new);
                std::thread::sleep(Duration::from_millis(250));
            }
        })?;

    Ok(pb)
}
