//! Turns the timing facts of a finished run into a score and recommendations.
//!
//! The verdict is picked by walking [VERDICT_RULES] top to bottom and taking the first rule that
//! applies. Every entry of [SCORE_OVERRIDES] that applies is then layered on top, in order.

use chrono::{DateTime, Local};
use ldap_siege_core::prelude::MissingStartTimeError;
use ldap_siege_report_model::{
    EndReason, ErrorRateBucket, LatencyBucket, RunMode, RunReport, RunStats, Score,
    REPORT_TIMESTAMP_FORMAT,
};

use crate::clock::elapsed_secs;
use crate::config::RunConfiguration;

/// Startup and teardown slack for the load generator. A run that ends within this many seconds of
/// its planned duration still counts as having survived.
pub const PREMATURE_TOLERANCE_SECS: u64 = 5;

/// Above this many virtual users a surviving run only scores [Score::C].
pub const HIGH_LOAD_VUS: u32 = 500;

const COMPLETED_SUMMARY: &str = "TEST COMPLETED SUCCESSFULLY";

/// What is known about a run at the moment it finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFacts {
    pub run_id: String,
    pub report_started_at: Option<DateTime<Local>>,
    pub completed_at: DateTime<Local>,
    pub manual_stop: bool,
    pub ended_by: EndReason,
}

/// The inputs every rule is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub actual_secs: u64,
    pub planned_secs: u64,
    pub vus: u32,
    pub mode: RunMode,
    pub manual_stop: bool,
    pub premature_stop: bool,
}

impl Assessment {
    pub fn new(config: &RunConfiguration, facts: &RunFacts) -> Result<Self, MissingStartTimeError> {
        let started_at = facts
            .report_started_at
            .ok_or_else(MissingStartTimeError::default)?;
        let actual_secs = elapsed_secs(started_at, facts.completed_at);
        let planned_secs = config.planned_duration_secs().unwrap_or(actual_secs);

        Ok(Self {
            actual_secs,
            planned_secs,
            vus: config.vus,
            mode: config.mode,
            manual_stop: facts.manual_stop,
            premature_stop: is_premature_stop(actual_secs, planned_secs, facts.manual_stop),
        })
    }
}

/// A run stopped early if it fell more than [PREMATURE_TOLERANCE_SECS] short of plan without an
/// operator asking for it.
pub fn is_premature_stop(actual_secs: u64, planned_secs: u64, manual_stop: bool) -> bool {
    !manual_stop && actual_secs.saturating_add(PREMATURE_TOLERANCE_SECS) < planned_secs
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub score: Score,
    pub summary: String,
    pub recommendations: Vec<String>,
}

pub struct VerdictRule {
    pub name: &'static str,
    pub applies: fn(&Assessment) -> bool,
    pub verdict: fn(&Assessment) -> Verdict,
}

/// Ordered, first match wins. The last rule always applies.
pub static VERDICT_RULES: [VerdictRule; 4] = [
    VerdictRule {
        name: "manual stop",
        applies: |a| a.manual_stop,
        verdict: |a| Verdict {
            score: Score::B,
            summary: format!("Test manually stopped after {}s.", a.actual_secs),
            recommendations: vec!["Test was stopped by the user before completion.".to_string()],
        },
    },
    VerdictRule {
        name: "premature stop",
        applies: |a| a.premature_stop,
        verdict: |a| Verdict {
            score: Score::F,
            summary: format!("SERVER DOWN (Collapsed at {}s)", a.actual_secs),
            recommendations: vec![
                format!("CRITICAL: Server collapsed after {} seconds.", a.actual_secs),
                "Immediate Action: Check CPU Thermal Throttling or RAM saturation.".to_string(),
                "Reduce VU load by 50% and re-test to find safe baseline.".to_string(),
            ],
        },
    },
    VerdictRule {
        name: "high load",
        applies: |a| a.vus > HIGH_LOAD_VUS,
        verdict: |a| Verdict {
            score: Score::C,
            summary: COMPLETED_SUMMARY.to_string(),
            recommendations: vec![format!(
                "High Load ({} VUs) sustained, but check latency logs.",
                a.vus
            )],
        },
    },
    VerdictRule {
        name: "healthy",
        applies: |_| true,
        verdict: |_| Verdict {
            score: Score::A,
            summary: COMPLETED_SUMMARY.to_string(),
            recommendations: vec!["Server healthy. No premature failures detected.".to_string()],
        },
    },
];

pub struct ScoreOverride {
    pub name: &'static str,
    pub applies: fn(&Assessment) -> bool,
    pub apply: fn(&mut Verdict),
}

/// Applied after the verdict rules, keeping their recommendations.
pub static SCORE_OVERRIDES: [ScoreOverride; 1] = [ScoreOverride {
    name: "audit finding",
    applies: |a| a.mode == RunMode::Audit,
    apply: |verdict| {
        verdict.score = Score::D;
        verdict
            .recommendations
            .push("Audit Found: Anonymous Bind Enabled (Security Risk).".to_string());
    },
}];

pub fn judge(assessment: &Assessment) -> Verdict {
    let rule = VERDICT_RULES
        .iter()
        .find(|rule| (rule.applies)(assessment))
        .unwrap_or(&VERDICT_RULES[VERDICT_RULES.len() - 1]);
    log::debug!("Verdict rule '{}' matched", rule.name);
    let mut verdict = (rule.verdict)(assessment);

    for score_override in SCORE_OVERRIDES
        .iter()
        .filter(|score_override| (score_override.applies)(assessment))
    {
        log::debug!("Score override '{}' applied", score_override.name);
        (score_override.apply)(&mut verdict);
    }

    verdict
}

/// Build the report for a finished run.
///
/// Fails only if the run never recorded when it started.
pub fn compute_report(
    config: &RunConfiguration,
    facts: &RunFacts,
) -> Result<RunReport, MissingStartTimeError> {
    let assessment = Assessment::new(config, facts)?;
    let verdict = judge(&assessment);

    Ok(RunReport {
        run_id: facts.run_id.clone(),
        summary: verdict.summary,
        target: config.target.clone(),
        mode: config.mode,
        timestamp: facts.completed_at.format(REPORT_TIMESTAMP_FORMAT).to_string(),
        score: verdict.score,
        ended_by: facts.ended_by,
        stats: RunStats {
            peak_vus: config.vus,
            survival_time: format!("{}s / {}s", assessment.actual_secs, assessment.planned_secs),
            avg_latency: if assessment.premature_stop {
                LatencyBucket::High
            } else {
                LatencyBucket::Normal
            },
            error_rate: if assessment.premature_stop {
                ErrorRateBucket::Aborted
            } else {
                ErrorRateBucket::Nominal
            },
        },
        recommendations: verdict.recommendations,
    })
}
