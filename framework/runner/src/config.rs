use std::path::PathBuf;
use std::time::Duration;

use ldap_siege_report_model::RunMode;

/// Everything the operator chose for a run. Fixed once the run has started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfiguration {
    /// Host or IP of the directory service under test
    pub target: String,
    /// Number of virtual users
    pub vus: u32,
    /// Planned duration as given by the operator, e.g. `30s`
    pub duration: String,
    pub mode: RunMode,
    /// Distinguished name to bind as, `guest` if unset
    pub user_dn: Option<String>,
    pub password: Option<String>,
    /// CSV of `dn,password` rows that virtual users cycle through instead of a single account
    pub user_list: Option<PathBuf>,
}

impl RunConfiguration {
    pub fn new(target: impl Into<String>, vus: u32, duration: impl Into<String>, mode: RunMode) -> Self {
        Self {
            target: target.into(),
            vus,
            duration: duration.into(),
            mode,
            user_dn: None,
            password: None,
            user_list: None,
        }
    }

    pub fn with_credentials(mut self, user_dn: impl Into<String>, password: impl Into<String>) -> Self {
        self.user_dn = Some(user_dn.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_user_list(mut self, path: impl Into<PathBuf>) -> Self {
        self.user_list = Some(path.into());
        self
    }

    /// Planned duration in whole seconds, if the duration string can be read as one.
    ///
    /// A single trailing `s` is accepted. Anything else yields [None], and callers substitute the
    /// observed duration instead of failing.
    pub fn planned_duration_secs(&self) -> Option<u64> {
        let trimmed = self.duration.trim();
        let digits = trimmed.strip_suffix('s').unwrap_or(trimmed);
        digits.parse::<u64>().ok()
    }

    pub fn planned_duration(&self) -> Option<Duration> {
        self.planned_duration_secs().map(Duration::from_secs)
    }

    pub fn uses_user_list(&self) -> bool {
        self.user_list.is_some()
    }
}
