use ldap_siege_report_model::RunReport;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Finished")]
    timestamp: String,
    #[tabled(rename = "Run")]
    run_id: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Survival")]
    survival_time: String,
    #[tabled(rename = "Summary")]
    summary: String,
}

pub fn report_table(report: &RunReport) -> String {
    let mut rows = vec![
        ReportRow {
            field: "Run",
            value: report.run_id.clone(),
        },
        ReportRow {
            field: "Target",
            value: report.target.clone(),
        },
        ReportRow {
            field: "Mode",
            value: report.mode.to_string(),
        },
        ReportRow {
            field: "Finished",
            value: report.timestamp.clone(),
        },
        ReportRow {
            field: "Ended by",
            value: report.ended_by.to_string(),
        },
        ReportRow {
            field: "Score",
            value: report.score.to_string(),
        },
        ReportRow {
            field: "Summary",
            value: report.summary.clone(),
        },
        ReportRow {
            field: "Peak VUs",
            value: report.stats.peak_vus.to_string(),
        },
        ReportRow {
            field: "Survival",
            value: report.stats.survival_time.clone(),
        },
        ReportRow {
            field: "Latency",
            value: report.stats.avg_latency.to_string(),
        },
        ReportRow {
            field: "Error rate",
            value: report.stats.error_rate.to_string(),
        },
    ];
    rows.extend(
        report
            .recommendations
            .iter()
            .enumerate()
            .map(|(i, recommendation)| ReportRow {
                field: "Recommendation",
                value: format!("{}. {recommendation}", i + 1),
            }),
    );

    let mut table = Table::new(rows);
    table.with(Style::modern());
    table.to_string()
}

pub fn print_report(report: &RunReport) {
    println!("\nRun report");
    println!("{}", report_table(report));
}

pub fn history_table(reports: &[RunReport]) -> String {
    let rows = reports.iter().map(|report| HistoryRow {
        timestamp: report.timestamp.clone(),
        run_id: report.run_id.clone(),
        target: report.target.clone(),
        mode: report.mode.to_string(),
        score: report.score.to_string(),
        survival_time: report.stats.survival_time.clone(),
        summary: report.summary.clone(),
    });

    let mut table = Table::new(rows);
    table.with(Style::modern());
    table.to_string()
}
