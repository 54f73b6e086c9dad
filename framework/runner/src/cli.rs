use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use ldap_siege_report_model::RunMode;

use crate::config::RunConfiguration;

#[derive(Parser)]
#[command(about, version, long_about = None)]
pub struct SiegeCli {
    #[command(subcommand)]
    pub command: SiegeCommand,
}

#[derive(Subcommand)]
pub enum SiegeCommand {
    /// Run the load generator against a directory service and report how it held up
    Run(RunArgs),
    /// Show reports of previous runs
    History(HistoryArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Host or IP of the directory service to test
    #[arg(long)]
    pub target: String,

    /// The number of virtual users
    #[arg(long, default_value_t = 10)]
    pub vus: u32,

    /// How long to run for, in seconds with an optional `s` suffix
    #[arg(long, default_value = "30s")]
    pub duration: String,

    /// `load` for sustained bind and search load, `audit` for a single security probe
    #[arg(long, default_value_t = RunMode::Load)]
    pub mode: RunMode,

    /// Distinguished name to bind as
    #[arg(long)]
    pub user_dn: Option<String>,

    /// Password for `--user-dn`
    #[arg(long, env = "SIEGE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// CSV file of `dn,password` rows for the virtual users to cycle through
    #[arg(long)]
    pub user_list: Option<PathBuf>,

    /// Directory that each run gets its own sub-directory in
    #[arg(long, default_value = "results")]
    pub results_dir: PathBuf,

    /// JSON lines file that finished reports are appended to
    #[arg(long, default_value = "results/history.jsonl")]
    pub history: PathBuf,

    /// Milliseconds between status polls
    #[arg(long, default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[arg(long, default_value = "false")]
    pub no_progress: bool,
}

impl RunArgs {
    pub fn run_configuration(&self) -> RunConfiguration {
        RunConfiguration {
            target: self.target.clone(),
            vus: self.vus,
            duration: self.duration.clone(),
            mode: self.mode,
            user_dn: self.user_dn.clone(),
            password: self.password.clone(),
            user_list: self.user_list.clone(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct HistoryArgs {
    /// JSON lines file written by `run`
    #[arg(long, default_value = "results/history.jsonl")]
    pub history: PathBuf,

    /// Only show the most recent reports
    #[arg(long)]
    pub last: Option<usize>,
}
