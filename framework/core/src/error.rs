/// Returned when a run is started while the previous load generator process is still alive.
///
/// Only one run may be live at a time. Callers are expected to stop the active run, or wait for it
/// to finish, before starting another one.
#[derive(derive_more::Error, derive_more::Display, Debug, Clone, PartialEq, Eq)]
#[display("A run is already active (load generator pid {pid})")]
pub struct AlreadyRunningError {
    pid: u32,
}

impl AlreadyRunningError {
    pub fn new(pid: u32) -> Self {
        Self { pid }
    }

    /// The process id of the load generator that is still running.
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// Returned when a report is requested for a run that never recorded a start time.
#[derive(derive_more::Error, derive_more::Display, Debug, Clone, PartialEq, Eq)]
pub struct MissingStartTimeError {
    msg: String,
}

impl Default for MissingStartTimeError {
    fn default() -> Self {
        Self {
            msg: "Cannot derive a report without a known run start time".to_string(),
        }
    }
}
