use serde::Serialize;

/// Answer to a status poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, derive_more::Display)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// The load generator is still working through its plan.
    #[display("running (pid {pid}, {elapsed_seconds}s)")]
    Running {
        pid: u32,
        elapsed_seconds: u64,
        recent_log_lines: Vec<String>,
    },
    /// The run has been finalized and a report is available.
    #[display("finished")]
    Finished { recent_log_lines: Vec<String> },
    /// Nothing is running, either never started or already wound down.
    #[display("stopped")]
    Stopped,
}

impl RunStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, RunStatus::Running { .. })
    }

    pub fn recent_log_lines(&self) -> &[String] {
        match self {
            RunStatus::Running {
                recent_log_lines, ..
            }
            | RunStatus::Finished { recent_log_lines } => recent_log_lines,
            RunStatus::Stopped => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_status_tag() {
        let running = RunStatus::Running {
            pid: 77,
            elapsed_seconds: 3,
            recent_log_lines: vec!["line".to_string()],
        };
        let json = serde_json::to_value(&running).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["pid"], 77);
        assert_eq!(json["elapsed_seconds"], 3);

        let stopped = serde_json::to_value(RunStatus::Stopped).unwrap();
        assert_eq!(stopped, serde_json::json!({ "status": "stopped" }));
    }

    #[test]
    fn stopped_has_no_lines() {
        assert!(RunStatus::Stopped.recent_log_lines().is_empty());
        assert!(!RunStatus::Stopped.is_running());
    }
}
