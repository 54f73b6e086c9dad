//! Prepares everything the load generator needs for one run: the rendered script and a fresh
//! output directory for its metrics and log.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;
use ldap_siege_report_model::RunMode;

use crate::config::RunConfiguration;
use crate::types::SiegeResult;

const LOAD_TEMPLATE: &str = include_str!("../scripts/ldap_load.js");
const AUDIT_TEMPLATE: &str = include_str!("../scripts/ldap_audit.js");

/// Latency p95 must stay under 5s, and the generator aborts once 10% of requests fail.
const THRESHOLDS_BODY: &str = r#"{
    'http_req_duration': ['p(95)<5000'],
    'http_req_failed': [{ threshold: 'rate<0.10', abortOnFail: true }],
  }"#;

const DEFAULT_CREDENTIAL: &str = "guest";

pub const SCRIPT_FILE_NAME: &str = "script.js";
pub const METRICS_FILE_NAME: &str = "metrics.json";
pub const LOG_FILE_NAME: &str = "output.log";
pub const USER_LIST_FILE_NAME: &str = "users.csv";

/// Paths produced for a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedRun {
    pub run_id: String,
    pub script_path: PathBuf,
    /// Directory owned by this run, nothing else writes here
    pub output_dir: PathBuf,
    /// Where the load generator writes its raw metrics
    pub metrics_path: PathBuf,
    /// Combined stdout and stderr of the load generator
    pub log_path: PathBuf,
}

impl ProvisionedRun {
    /// Lay out the standard file names inside `output_dir`.
    pub fn in_dir(run_id: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        Self {
            run_id: run_id.into(),
            script_path: output_dir.join(SCRIPT_FILE_NAME),
            metrics_path: output_dir.join(METRICS_FILE_NAME),
            log_path: output_dir.join(LOG_FILE_NAME),
            output_dir,
        }
    }
}

/// Produces the script and output locations for a run. Called once per run start.
pub trait ScriptProvisioner: Send {
    fn provision(&self, config: &RunConfiguration) -> SiegeResult<ProvisionedRun>;
}

/// Renders the embedded templates into `<results_dir>/<timestamp>_<id>/`.
#[derive(Debug, Clone)]
pub struct TemplateProvisioner {
    results_dir: PathBuf,
}

impl TemplateProvisioner {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }
}

impl ScriptProvisioner for TemplateProvisioner {
    fn provision(&self, config: &RunConfiguration) -> SiegeResult<ProvisionedRun> {
        let run_id = nanoid::nanoid!(10);
        let dir_name = format!("{}_{run_id}", Local::now().format("%Y%m%d_%H%M%S"));
        let run = ProvisionedRun::in_dir(run_id, self.results_dir.join(dir_name));

        std::fs::create_dir_all(&run.output_dir).with_context(|| {
            format!("Failed to create run directory '{}'", run.output_dir.display())
        })?;
        let output_dir = run.output_dir.canonicalize()?;
        let run = ProvisionedRun::in_dir(run.run_id, output_dir);

        let user_list = match &config.user_list {
            Some(source) => {
                let dest = run.output_dir.join(USER_LIST_FILE_NAME);
                std::fs::copy(source, &dest).with_context(|| {
                    format!("Failed to copy user list '{}'", source.display())
                })?;
                Some(dest)
            }
            None => None,
        };

        let script = render_script(config, user_list.as_deref());
        std::fs::write(&run.script_path, script).with_context(|| {
            format!("Failed to write script '{}'", run.script_path.display())
        })?;

        log::info!(
            "Provisioned {} run {} in '{}'",
            config.mode,
            run.run_id,
            run.output_dir.display()
        );
        Ok(run)
    }
}

/// Substitute the run configuration into the template for its mode.
pub fn render_script(config: &RunConfiguration, user_list: Option<&Path>) -> String {
    let template = match config.mode {
        RunMode::Load => LOAD_TEMPLATE,
        RunMode::Audit => AUDIT_TEMPLATE,
    };

    let scenario_body = format!(
        "{{\n    executor: 'constant-vus',\n    vus: {},\n    duration: '{}',\n  }}",
        config.vus,
        escape_js(&config.duration)
    );
    let user_dn = config
        .user_dn
        .as_deref()
        .filter(|dn| !dn.is_empty())
        .unwrap_or(DEFAULT_CREDENTIAL);
    let password = config
        .password
        .as_deref()
        .filter(|password| !password.is_empty())
        .unwrap_or(DEFAULT_CREDENTIAL);
    let user_list_path = user_list
        .map(|path| path.display().to_string())
        .unwrap_or_default();

    template
        .replace("__TARGET_IP__", &escape_js(&config.target))
        .replace("__USER_DN__", &escape_js(user_dn))
        .replace("__PASSWORD__", &escape_js(password))
        .replace("__SCENARIO_NAME__", config.mode.scenario_name())
        .replace("__SCENARIO_BODY__", &scenario_body)
        .replace("__THRESHOLDS_BODY__", THRESHOLDS_BODY)
        .replace("__USE_CSV__", if user_list.is_some() { "true" } else { "false" })
        .replace("__USER_LIST_PATH__", &escape_js(&user_list_path))
}

/// Escape a value for a single-quoted JavaScript string literal.
fn escape_js(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            _ => escaped.push(c),
        }
    }
    escaped
}
