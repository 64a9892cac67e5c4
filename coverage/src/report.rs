//! Plain-text and JSON rendering of a [`CoverageReport`].

use crate::checker::CoverageReport;
use crate::verdict::Verdict;
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

pub fn render(report: &CoverageReport, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(render_text(report)),
        ReportFormat::Json => serde_json::to_string_pretty(report),
    }
}

pub fn render_text(report: &CoverageReport) -> String {
    let mut out = format!(
        "Requirement {} '{}' ({})\n",
        report.requirement.id, report.requirement.title, report.requirement.work_item_type
    );
    out.push_str(&format!(
        "Project: {} @ {}\n\n",
        report.project, report.collection_url
    ));

    for (id, coverage) in report.matrix.iter() {
        let verdict = report
            .verdict_for(*id)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "Test case {} '{}': {}\n",
            id, coverage.test_case.title, verdict
        ));

        for plan in coverage.plans.values() {
            out.push_str(&format!("  Plan {} '{}'\n", plan.plan.id, plan.plan.name));
            for entry in plan.configurations.values() {
                let default_marker = if entry.configuration.is_default {
                    " (default)"
                } else {
                    ""
                };
                out.push_str(&format!(
                    "    {}{}: {}\n",
                    entry.configuration.name, default_marker, entry.outcome
                ));
            }
        }
    }

    if !report.uncovered_test_cases.is_empty() {
        out.push_str("Not in any active test plan:\n");
        for test_case in &report.uncovered_test_cases {
            out.push_str(&format!("  {} '{}'\n", test_case.id, test_case.title));
        }
    }

    out.push_str(&format!(
        "\nCoverage verdict: {}\n",
        report.requirement_verdict
    ));
    out
}

/// Process exit code for a finished check. 1 is left for errors.
pub fn exit_code(verdict: Verdict) -> u8 {
    match verdict {
        Verdict::Passed => 0,
        Verdict::Failed => 3,
        Verdict::Inconclusive => 4,
    }
}
